//! Configuration for the document pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built through
//! [`PipelineConfigBuilder`]. Provider objects are not part of the config;
//! they are resolved separately into [`crate::providers::Providers`] so
//! tests can inject fakes without touching any setting here.

use crate::error::DoclensError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Upper bound on `max_retries`; backoff doubles per attempt.
pub const MAX_RETRIES_CAP: u32 = 10;

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use edgequake_doclens::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(4)
///     .min_chars_per_page(60)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_batch_size, 10);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Documents processed at the same time. Default: 10.
    pub concurrency: usize,

    /// Upload cap: batches larger than this are rejected before any work. Default: 10.
    pub max_batch_size: usize,

    /// Native PDF text is "sufficient" only when its non-whitespace character
    /// count exceeds `min_chars_per_page × page_count`. Default: 40.
    ///
    /// This is a heuristic. A scanned page often still carries a running
    /// header or a page number in its text layer, which stays well below 40
    /// characters; a real text page is almost always far above it. Short
    /// genuine pages (a cover sheet, a signature page) can fall under the
    /// threshold and are then sent to OCR.
    pub min_chars_per_page: usize,

    /// Leading window of extracted text sent to the classifier. Default: 4000.
    pub max_classification_chars: usize,

    /// Total characters of document text in the consolidated prompt, split
    /// evenly across included documents. Default: 12000.
    pub consolidated_char_budget: usize,

    /// Leading window of one document's text sent to the per-document
    /// analysis in individual mode. Default: 8000.
    pub analysis_char_budget: usize,

    /// Characters of extracted text echoed back in each report. Default: 1000.
    pub text_preview_chars: usize,

    /// Run the per-document analysis in individual mode. Default: true.
    pub analyze_documents: bool,

    /// LLM model identifier. If None, `gpt-4.1-nano` is used for named providers.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Enable the OCR fallback path. Default: true.
    pub ocr_enabled: bool,

    /// Provider used for OCR transcription. Falls back to the text provider.
    pub ocr_provider_name: Option<String>,

    /// Vision model used for OCR transcription. Falls back to `model`.
    pub ocr_model: Option<String>,

    /// Pages of one document transcribed at the same time. Default: 4.
    pub ocr_page_concurrency: usize,

    /// Free-text hint passed to the OCR engine with every request, e.g.
    /// "totals are in the table at the bottom of each page". Default: none.
    pub ocr_region_hint: Option<String>,

    /// Sampling temperature for classification and analysis. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 3000.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient provider failure. Default: 3,
    /// capped at [`MAX_RETRIES_CAP`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per model call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Whole-document OCR timeout in seconds. Default: 180.
    pub ocr_timeout_secs: u64,

    /// Deadline for an entire batch. None means no deadline.
    pub batch_timeout_secs: Option<u64>,

    /// Longest edge, in pixels, of a PDF page rasterised for OCR. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-document progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_batch_size: 10,
            min_chars_per_page: 40,
            max_classification_chars: 4000,
            consolidated_char_budget: 12_000,
            analysis_char_budget: 8000,
            text_preview_chars: 1000,
            analyze_documents: true,
            model: None,
            provider_name: None,
            ocr_enabled: true,
            ocr_provider_name: None,
            ocr_model: None,
            ocr_page_concurrency: 4,
            ocr_region_hint: None,
            temperature: 0.2,
            max_tokens: 3000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            ocr_timeout_secs: 180,
            batch_timeout_secs: None,
            max_rendered_pixels: 2000,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_batch_size", &self.max_batch_size)
            .field("min_chars_per_page", &self.min_chars_per_page)
            .field("max_classification_chars", &self.max_classification_chars)
            .field("consolidated_char_budget", &self.consolidated_char_budget)
            .field("analysis_char_budget", &self.analysis_char_budget)
            .field("analyze_documents", &self.analyze_documents)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("ocr_provider_name", &self.ocr_provider_name)
            .field("ocr_model", &self.ocr_model)
            .field("ocr_page_concurrency", &self.ocr_page_concurrency)
            .field("ocr_region_hint", &self.ocr_region_hint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = n;
        self
    }

    pub fn min_chars_per_page(mut self, n: usize) -> Self {
        self.config.min_chars_per_page = n;
        self
    }

    pub fn max_classification_chars(mut self, n: usize) -> Self {
        self.config.max_classification_chars = n;
        self
    }

    pub fn consolidated_char_budget(mut self, n: usize) -> Self {
        self.config.consolidated_char_budget = n;
        self
    }

    pub fn analysis_char_budget(mut self, n: usize) -> Self {
        self.config.analysis_char_budget = n;
        self
    }

    pub fn text_preview_chars(mut self, n: usize) -> Self {
        self.config.text_preview_chars = n;
        self
    }

    pub fn analyze_documents(mut self, v: bool) -> Self {
        self.config.analyze_documents = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn ocr_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.ocr_provider_name = Some(name.into());
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = Some(model.into());
        self
    }

    pub fn ocr_page_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_page_concurrency = n.max(1);
        self
    }

    pub fn ocr_region_hint(mut self, hint: impl Into<String>) -> Self {
        self.config.ocr_region_hint = Some(hint.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES_CAP);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn batch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.batch_timeout_secs = Some(secs);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DoclensError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DoclensError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_batch_size == 0 {
            return Err(DoclensError::InvalidConfig(
                "Batch size cap must be ≥ 1".into(),
            ));
        }
        if c.max_classification_chars == 0 {
            return Err(DoclensError::InvalidConfig(
                "Classification window must be ≥ 1 character".into(),
            ));
        }
        if c.consolidated_char_budget == 0 {
            return Err(DoclensError::InvalidConfig(
                "Consolidated character budget must be ≥ 1".into(),
            ));
        }
        if c.analysis_char_budget == 0 {
            return Err(DoclensError::InvalidConfig(
                "Analysis character budget must be ≥ 1".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(DoclensError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.batch_timeout_secs == Some(0) {
            return Err(DoclensError::InvalidConfig(
                "Batch timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
