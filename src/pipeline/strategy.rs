//! Extraction strategy: native parser, OCR, or native with OCR fallback.
//!
//! | Kind              | Path                                     |
//! |-------------------|------------------------------------------|
//! | CSV / XLSX / DOCX | native only; a parse error is final      |
//! | Image             | OCR only                                 |
//! | PDF               | native text layer, OCR if it is too thin |
//!
//! For PDFs only the *quality* of the native text is second-guessed. A PDF
//! the native parser cannot open at all fails with `ExtractionFailure`:
//! rasterising pages for OCR needs the same container to parse.

use crate::config::PipelineConfig;
use crate::document::{DocumentKind, ExtractionMethod, ExtractionOutcome, ExtractionStrategy};
use crate::error::DocumentError;
use crate::pipeline::detect::DetectedFormat;
use crate::pipeline::native::{NativeExtractor, NativeText};
use crate::pipeline::ocr::{recognize_with_timeout, OcrEngine, OcrError, OcrRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Non-whitespace characters in `text`.
pub fn meaningful_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Characters a PDF's native text must exceed to skip OCR.
pub fn required_chars(page_count: usize, min_chars_per_page: usize) -> usize {
    min_chars_per_page.saturating_mul(page_count.max(1))
}

/// Native text is sufficient when it is non-empty and exceeds the
/// per-page minimum times the page count.
pub fn is_sufficient(chars: usize, page_count: usize, min_chars_per_page: usize) -> bool {
    chars > 0 && chars > required_chars(page_count, min_chars_per_page)
}

/// Chooses and runs the extraction path for one document.
#[derive(Clone)]
pub struct ExtractionStrategySelector {
    native: Arc<dyn NativeExtractor>,
    ocr: Option<Arc<dyn OcrEngine>>,
    min_chars_per_page: usize,
    ocr_timeout_secs: u64,
    region_hint: Option<String>,
}

impl ExtractionStrategySelector {
    pub fn new(
        native: Arc<dyn NativeExtractor>,
        ocr: Option<Arc<dyn OcrEngine>>,
        min_chars_per_page: usize,
        ocr_timeout_secs: u64,
    ) -> Self {
        Self {
            native,
            ocr,
            min_chars_per_page,
            ocr_timeout_secs,
            region_hint: None,
        }
    }

    /// Attach a hint to every OCR request this selector makes.
    pub fn with_region_hint(mut self, hint: Option<String>) -> Self {
        self.region_hint = hint;
        self
    }

    pub fn from_config(
        config: &PipelineConfig,
        native: Arc<dyn NativeExtractor>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        Self::new(native, ocr, config.min_chars_per_page, config.ocr_timeout_secs)
            .with_region_hint(config.ocr_region_hint.clone())
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Extract text from `payload`. Never panics, never returns `Err`:
    /// every failure is a [`ExtractionOutcome::Failed`].
    pub async fn extract(&self, format: &DetectedFormat, payload: Arc<[u8]>) -> ExtractionOutcome {
        match format.kind.strategy() {
            ExtractionStrategy::NativeOnly => match self.run_native(format.kind, &payload).await {
                Ok(t) if meaningful_chars(&t.text) > 0 => extracted(t.text, ExtractionMethod::Native),
                Ok(_) => failed(blank_text()),
                Err(e) => failed(e),
            },
            ExtractionStrategy::OcrOnly => self.extract_image(format, payload).await,
            ExtractionStrategy::NativeWithOcrFallback => self.extract_pdf(format, payload).await,
        }
    }

    async fn run_native(
        &self,
        kind: DocumentKind,
        payload: &Arc<[u8]>,
    ) -> Result<NativeText, DocumentError> {
        let native = Arc::clone(&self.native);
        let bytes = Arc::clone(payload);
        tokio::task::spawn_blocking(move || native.extract(kind, &bytes))
            .await
            .unwrap_or_else(|e| {
                Err(DocumentError::ExtractionFailure {
                    cause: format!("native extractor panicked: {e}"),
                })
            })
    }

    async fn extract_image(&self, format: &DetectedFormat, payload: Arc<[u8]>) -> ExtractionOutcome {
        let Some(ocr) = self.ocr.as_deref() else {
            return failed(DocumentError::OcrUnavailable);
        };
        match recognize_with_timeout(ocr, self.request(format, payload), self.ocr_timeout_secs).await {
            Ok(out) if meaningful_chars(&out.text) > 0 => extracted(out.text, ExtractionMethod::Ocr),
            Ok(_) => failed(blank_text()),
            Err(OcrError::Timeout { secs }) => failed(DocumentError::OcrTimeout { secs }),
            Err(OcrError::Unavailable { reason }) => {
                warn!("OCR unavailable: {}", reason);
                failed(DocumentError::OcrUnavailable)
            }
            Err(OcrError::Failed { detail }) => {
                failed(DocumentError::ExtractionFailure { cause: detail })
            }
        }
    }

    async fn extract_pdf(&self, format: &DetectedFormat, payload: Arc<[u8]>) -> ExtractionOutcome {
        let native = match self.run_native(DocumentKind::Pdf, &payload).await {
            Ok(t) => t,
            Err(e) => return failed(e),
        };

        let chars = meaningful_chars(&native.text);
        let required = required_chars(native.page_count, self.min_chars_per_page);
        if is_sufficient(chars, native.page_count, self.min_chars_per_page) {
            debug!(
                "PDF text layer sufficient: {} chars over {} page(s)",
                chars, native.page_count
            );
            return extracted(native.text, ExtractionMethod::Native);
        }

        info!(
            "PDF text layer insufficient ({} chars, need more than {}); trying OCR",
            chars, required
        );
        let Some(ocr) = self.ocr.as_deref() else {
            return failed(DocumentError::OcrUnavailable);
        };
        match recognize_with_timeout(ocr, self.request(format, payload), self.ocr_timeout_secs).await {
            Ok(out) if meaningful_chars(&out.text) > 0 => extracted(out.text, ExtractionMethod::Ocr),
            Ok(_) => failed(DocumentError::InsufficientText {
                chars,
                required: required.saturating_add(1),
            }),
            Err(OcrError::Timeout { secs }) => failed(DocumentError::OcrTimeout { secs }),
            Err(OcrError::Unavailable { reason }) => {
                warn!("OCR unavailable: {}", reason);
                failed(DocumentError::OcrUnavailable)
            }
            Err(OcrError::Failed { detail }) => {
                warn!("OCR fallback failed: {}", detail);
                failed(DocumentError::InsufficientText {
                    chars,
                    required: required.saturating_add(1),
                })
            }
        }
    }
}

impl ExtractionStrategySelector {
    fn request(&self, format: &DetectedFormat, payload: Arc<[u8]>) -> OcrRequest {
        OcrRequest {
            payload,
            mime_type: format.mime_type.clone(),
            region_hint: self.region_hint.clone(),
        }
    }
}

/// No readable characters at all: at least one was needed.
fn blank_text() -> DocumentError {
    DocumentError::InsufficientText {
        chars: 0,
        required: 1,
    }
}

fn extracted(text: String, method: ExtractionMethod) -> ExtractionOutcome {
    ExtractionOutcome::Extracted { text, method }
}

fn failed(reason: DocumentError) -> ExtractionOutcome {
    ExtractionOutcome::Failed { reason }
}
