//! Per-document analysis for individual mode.
//!
//! Runs after a document is `Classified`. A failure here is recorded next to
//! the document and does not change its terminal state: the document was
//! still extracted and classified successfully.

use crate::config::PipelineConfig;
use crate::pipeline::classify::leading_window;
use crate::pipeline::llm::{parse_json_response, LanguageModel, ModelError, ModelRequest, ResponseShape};
use crate::prompts::{analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub language: String,
    #[serde(alias = "detailed_summary")]
    pub summary: String,
    #[serde(default, alias = "actionable_recommendations")]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub key_details: BTreeMap<String, serde_json::Value>,
}

pub struct DocumentAnalyzer {
    model: Arc<dyn LanguageModel>,
    max_chars: usize,
    temperature: f32,
    max_tokens: usize,
}

impl DocumentAnalyzer {
    pub fn from_config(config: &PipelineConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            max_chars: config.analysis_char_budget,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub async fn analyze(
        &self,
        filename: &str,
        document_type: &str,
        text: &str,
    ) -> Result<DocumentAnalysis, ModelError> {
        let (window, _) = leading_window(text, self.max_chars);
        let request = ModelRequest {
            shape: ResponseShape::DocumentAnalysis,
            system: ANALYSIS_SYSTEM_PROMPT.to_string(),
            prompt: analysis_prompt(filename, document_type, window),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let raw = self.model.complete(&request).await?;
        let analysis: DocumentAnalysis = parse_json_response(&raw)?;
        if analysis.summary.trim().is_empty() {
            return Err(ModelError::Malformed {
                detail: "analysis has an empty summary".into(),
            });
        }
        Ok(analysis)
    }
}
