//! Document classification: leading window of text → [`DocumentType`].
//!
//! Only the first `max_classification_chars` characters are sent. This is
//! lossy: a contract whose first pages are a cover letter may be labelled
//! from the letter alone. In practice the label-bearing material (a title,
//! an invoice header, a statement heading) is near the top.

use crate::config::PipelineConfig;
use crate::document::{Classification, DocumentType};
use crate::error::DocumentError;
use crate::pipeline::llm::{parse_json_response, LanguageModel, ModelRequest, ResponseShape};
use crate::prompts::{classification_prompt, CLASSIFICATION_SYSTEM_PROMPT};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// A label needs a short answer; this keeps a confused model from rambling.
const CLASSIFICATION_MAX_TOKENS: usize = 300;

/// The first `max_chars` characters of `text`, cut on a char boundary,
/// and whether anything was cut.
pub fn leading_window(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    document_type: String,
    #[serde(default)]
    rationale: String,
}

/// Parse and validate a classification reply.
pub fn parse_classification(raw: &str) -> Result<Classification, DocumentError> {
    let parsed: RawClassification =
        parse_json_response(raw).map_err(|e| DocumentError::ClassificationFailure {
            detail: e.to_string(),
        })?;
    let label = parsed
        .document_type
        .parse::<DocumentType>()
        .map_err(|detail| DocumentError::ClassificationFailure { detail })?;
    Ok(Classification {
        label,
        rationale: parsed.rationale.trim().to_string(),
    })
}

pub struct DocumentClassifier {
    model: Arc<dyn LanguageModel>,
    max_chars: usize,
    temperature: f32,
}

impl DocumentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, max_chars: usize, temperature: f32) -> Self {
        Self {
            model,
            max_chars,
            temperature,
        }
    }

    pub fn from_config(config: &PipelineConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self::new(model, config.max_classification_chars, config.temperature)
    }

    /// Assign a label to already-extracted text. Reads the text only.
    pub async fn classify(&self, filename: &str, text: &str) -> Result<Classification, DocumentError> {
        let (excerpt, truncated) = leading_window(text, self.max_chars);
        if truncated {
            debug!(
                "{}: classifying on the first {} characters",
                filename, self.max_chars
            );
        }

        let request = ModelRequest {
            shape: ResponseShape::Classification,
            system: CLASSIFICATION_SYSTEM_PROMPT.to_string(),
            prompt: classification_prompt(filename, excerpt),
            temperature: self.temperature,
            max_tokens: CLASSIFICATION_MAX_TOKENS,
        };
        let raw = self
            .model
            .complete(&request)
            .await
            .map_err(|e| DocumentError::ClassificationFailure {
                detail: e.to_string(),
            })?;

        let c = parse_classification(&raw)?;
        debug!("{}: classified as {}", filename, c.label);
        Ok(c)
    }
}
