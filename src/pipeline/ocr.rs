//! OCR capability: bytes in, text out, behind a trait.
//!
//! [`OcrEngine`] is the contract the strategy selector depends on. The
//! production engine, [`VisionOcr`], rasterises PDF pages (or decodes an
//! uploaded image), sends each page to a vision-capable model for
//! transcription and stitches the pages back together in order.
//!
//! Timeouts are applied by the caller through [`recognize_with_timeout`],
//! so a slow engine of any kind is cut off the same way.

use crate::pipeline::llm::{chat_with_retry, ModelError, RetryPolicy};
use crate::pipeline::{encode, postprocess, render};
use crate::prompts::{ocr_region_hint, OCR_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub payload: Arc<[u8]>,
    pub mime_type: String,
    /// Free-text hint about where the relevant text sits ("the table on page 2").
    pub region_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// 0.0–1.0 when the engine can estimate it.
    pub confidence: Option<f32>,
    pub pages: usize,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OcrError {
    /// The engine cannot serve requests at all (no credentials, no backend).
    #[error("OCR engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("OCR timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The engine ran but could not recognise this payload.
    #[error("OCR failed: {detail}")]
    Failed { detail: String },
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self, request: OcrRequest) -> Result<OcrOutput, OcrError>;
}

/// Run `engine.recognize` under a deadline. On expiry the in-flight call is
/// dropped and [`OcrError::Timeout`] returned.
pub async fn recognize_with_timeout(
    engine: &dyn OcrEngine,
    request: OcrRequest,
    secs: u64,
) -> Result<OcrOutput, OcrError> {
    match timeout(Duration::from_secs(secs), engine.recognize(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("OCR engine '{}' exceeded {}s", engine.name(), secs);
            Err(OcrError::Timeout { secs })
        }
    }
}

// ── Vision-model engine ──────────────────────────────────────────────────

/// OCR through a vision language model.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    name: String,
    max_rendered_pixels: u32,
    page_concurrency: usize,
    max_tokens: usize,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy, name: impl Into<String>) -> Self {
        Self {
            provider,
            policy,
            name: name.into(),
            max_rendered_pixels: 2000,
            page_concurrency: 4,
            max_tokens: 4096,
        }
    }

    pub fn with_max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = px.max(100);
        self
    }

    pub fn with_page_concurrency(mut self, n: usize) -> Self {
        self.page_concurrency = n.max(1);
        self
    }

    async fn page_images(&self, request: &OcrRequest) -> Result<Vec<DynamicImage>, OcrError> {
        if request.mime_type == "application/pdf" {
            return render::render_pages(Arc::clone(&request.payload), self.max_rendered_pixels)
                .await
                .map_err(|e| OcrError::Failed {
                    detail: e.to_string(),
                });
        }
        if request.mime_type.starts_with("image/") {
            let bytes = Arc::clone(&request.payload);
            let max = self.max_rendered_pixels;
            let img = tokio::task::spawn_blocking(move || encode::decode_upload(&bytes, max))
                .await
                .map_err(|e| OcrError::Failed {
                    detail: format!("decode task panicked: {e}"),
                })?
                .map_err(|e| OcrError::Failed {
                    detail: format!("image decode failed: {e}"),
                })?;
            return Ok(vec![img]);
        }
        Err(OcrError::Failed {
            detail: format!("cannot OCR '{}' payloads", request.mime_type),
        })
    }

    async fn transcribe_page(
        &self,
        page_num: usize,
        image: ImageData,
        hint: Option<&str>,
    ) -> Result<String, ModelError> {
        let mut messages = vec![ChatMessage::system(OCR_SYSTEM_PROMPT)];
        if let Some(h) = hint {
            messages.push(ChatMessage::system(ocr_region_hint(h)));
        }
        messages.push(ChatMessage::user_with_images("", vec![image]));

        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };
        let label = format!("OCR page {page_num}");
        let reply = chat_with_retry(&self.provider, &messages, &options, &self.policy, &label).await?;
        Ok(postprocess::clean_transcript(&reply))
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, request: OcrRequest) -> Result<OcrOutput, OcrError> {
        let images = self.page_images(&request).await?;
        let total = images.len();
        if total == 0 {
            return Err(OcrError::Failed {
                detail: "document has no pages".into(),
            });
        }

        let mut encoded = Vec::with_capacity(total);
        for (idx, img) in images.iter().enumerate() {
            let data = encode::encode_page(img).map_err(|e| OcrError::Failed {
                detail: format!("page {} encoding failed: {e}", idx + 1),
            })?;
            encoded.push((idx + 1, data));
        }
        drop(images);

        info!("{}: transcribing {} page(s)", self.name, total);
        let hint = request.region_hint.as_deref();
        // `buffered` keeps page order while still overlapping requests.
        let results: Vec<Result<String, ModelError>> = stream::iter(encoded)
            .map(|(page_num, data)| self.transcribe_page(page_num, data, hint))
            .buffered(self.page_concurrency)
            .collect()
            .await;

        let mut pages = Vec::with_capacity(total);
        let mut first_error: Option<ModelError> = None;
        for (idx, r) in results.into_iter().enumerate() {
            match r {
                Ok(text) => pages.push(text),
                Err(e) => {
                    warn!("{}: page {} failed: {}", self.name, idx + 1, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if pages.is_empty() {
            let detail = first_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no page produced text".into());
            return Err(OcrError::Failed { detail });
        }

        let confidence = pages.len() as f32 / total as f32;
        debug!(
            "{}: {}/{} pages transcribed",
            self.name,
            pages.len(),
            total
        );
        Ok(OcrOutput {
            text: pages.join("\n"),
            confidence: Some(confidence),
            pages: total,
        })
    }
}
