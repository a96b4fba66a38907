//! Capability wiring: which model, OCR engine and native extractor a batch uses.
//!
//! The pipeline only sees the [`LanguageModel`], [`OcrEngine`] and
//! [`NativeExtractor`] traits. [`Providers::resolve`] builds the production
//! set from config and environment; tests build one from fakes with
//! [`Providers::new`].

use crate::config::PipelineConfig;
use crate::error::DoclensError;
use crate::pipeline::llm::{EdgequakeModel, LanguageModel, RetryPolicy};
use crate::pipeline::native::{NativeExtractor, StandardExtractor};
use crate::pipeline::ocr::{OcrEngine, VisionOcr};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// The capabilities one batch runs with.
#[derive(Clone)]
pub struct Providers {
    pub language_model: Arc<dyn LanguageModel>,
    /// `None` disables OCR: scanned PDFs and images fail with `OcrUnavailable`.
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub native: Arc<dyn NativeExtractor>,
}

impl Providers {
    /// A model with the standard native extractor and no OCR.
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            language_model,
            ocr: None,
            native: Arc::new(StandardExtractor),
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn without_ocr(mut self) -> Self {
        self.ocr = None;
        self
    }

    pub fn with_native(mut self, native: Arc<dyn NativeExtractor>) -> Self {
        self.native = native;
        self
    }

    /// Use one pre-built `edgequake-llm` provider for both text and OCR.
    pub fn from_llm_provider(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        let policy = RetryPolicy::from_config(config);
        let name = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let model = Arc::new(EdgequakeModel::new(Arc::clone(&provider), policy, name));
        let mut providers = Self::new(model);
        if config.ocr_enabled {
            providers = providers.with_ocr(Arc::new(vision_ocr(provider, config, name)));
        }
        providers
    }

    /// Resolve providers from config and environment.
    ///
    /// The text provider is mandatory. An OCR provider that cannot be
    /// created is logged and left out; the batch still runs, and documents
    /// that need OCR fail individually.
    pub async fn resolve(config: &PipelineConfig) -> Result<Self, DoclensError> {
        let (provider, label) = resolve_text_provider(config)?;
        info!("Using language model provider '{}'", label);
        let policy = RetryPolicy::from_config(config);
        let model = Arc::new(EdgequakeModel::new(Arc::clone(&provider), policy, label.clone()));
        let mut providers = Self::new(model);

        if !config.ocr_enabled {
            info!("OCR disabled; image-only documents will be rejected");
            return Ok(providers);
        }

        match (&config.ocr_provider_name, &config.ocr_model) {
            (None, None) => {
                providers = providers.with_ocr(Arc::new(vision_ocr(provider, config, &label)));
            }
            (name, model) => {
                let name = name
                    .as_deref()
                    .or(config.provider_name.as_deref())
                    .unwrap_or("openai");
                let model = model
                    .as_deref()
                    .or(config.model.as_deref())
                    .unwrap_or(DEFAULT_MODEL);
                match create_provider(name, model) {
                    Ok(ocr_provider) => {
                        let label = format!("{name}/{model}");
                        info!("Using OCR provider '{}'", label);
                        providers =
                            providers.with_ocr(Arc::new(vision_ocr(ocr_provider, config, &label)));
                    }
                    Err(e) => {
                        warn!("OCR provider unavailable, continuing without OCR: {}", e);
                    }
                }
            }
        }
        Ok(providers)
    }
}

fn vision_ocr(provider: Arc<dyn LLMProvider>, config: &PipelineConfig, name: &str) -> VisionOcr {
    VisionOcr::new(provider, RetryPolicy::from_config(config), name)
        .with_max_rendered_pixels(config.max_rendered_pixels)
        .with_page_concurrency(config.ocr_page_concurrency)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DoclensError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DoclensError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the text provider, from most specific to least specific:
///
/// 1. `config.provider_name` (+ `config.model`)
/// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 3. OpenAI, when `OPENAI_API_KEY` is set
/// 4. `ProviderFactory::from_env` auto-detection
fn resolve_text_provider(
    config: &PipelineConfig,
) -> Result<(Arc<dyn LLMProvider>, String), DoclensError> {
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return Ok((create_provider(name, model)?, format!("{name}/{model}")));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok((create_provider(&prov, &model)?, format!("{prov}/{model}")));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return Ok((create_provider("openai", model)?, format!("openai/{model}")));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DoclensError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok((llm_provider, "auto".to_string()))
}
