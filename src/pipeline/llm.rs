//! Language-model capability: trait, real client, retry and JSON parsing.
//!
//! Every stage that talks to a model (classification, per-document
//! analysis, consolidation, OCR transcription) goes through
//! [`chat_with_retry`], so retry, backoff and timeout behave the same
//! everywhere. Prompt text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^(attempt - 1)`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Malformed responses are not retried; a model that
//! answered once with prose tends to answer again with prose.

use crate::config::PipelineConfig;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// What a request expects back. Lets fakes answer by shape and lets logs
/// say which stage a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    Classification,
    DocumentAnalysis,
    Consolidated,
}

impl ResponseShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseShape::Classification => "classification",
            ResponseShape::DocumentAnalysis => "document_analysis",
            ResponseShape::Consolidated => "consolidated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub shape: ResponseShape,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// Transport or API failure after every retry.
    #[error("provider call failed after {attempts} attempt(s): {detail}")]
    Provider { attempts: u32, detail: String },

    /// The last attempt did not answer in time.
    #[error("provider call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered but not in the expected shape.
    #[error("malformed response: {detail}")]
    Malformed { detail: String },
}

/// Text-completion capability used by classification and analysis.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Retry/backoff/timeout knobs shared by every model call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). Saturates instead of
    /// overflowing for large attempt counts.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Send `messages`, retrying transport failures and timeouts.
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: &RetryPolicy,
    label: &str,
) -> Result<String, ModelError> {
    let start = Instant::now();
    let mut last_err: Option<ModelError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff_delay(attempt);
            warn!(
                "{}: retry {}/{} after {:?}",
                label, attempt, policy.max_retries, backoff
            );
            sleep(backoff).await;
        }

        let call = provider.chat(messages, Some(options));
        match timeout(Duration::from_secs(policy.timeout_secs), call).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = Some(ModelError::Provider {
                    attempts: attempt + 1,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    policy.timeout_secs
                );
                last_err = Some(ModelError::Timeout {
                    secs: policy.timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or(ModelError::Provider {
        attempts: 0,
        detail: "no attempt was made".into(),
    }))
}

/// [`LanguageModel`] backed by an `edgequake-llm` provider.
pub struct EdgequakeModel {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    name: String,
}

impl EdgequakeModel {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy, name: impl Into<String>) -> Self {
        Self {
            provider,
            policy,
            name: name.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for EdgequakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };
        chat_with_retry(
            &self.provider,
            &messages,
            &options,
            &self.policy,
            request.shape.as_str(),
        )
        .await
    }
}

/// Parse a JSON object out of a model reply.
///
/// Models wrap JSON in ```json fences or add a sentence before it despite
/// being told not to; everything outside the outermost `{ … }` is ignored.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, ModelError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => {
            return Err(ModelError::Malformed {
                detail: format!("no JSON object in response: {}", preview(raw)),
            })
        }
    };
    serde_json::from_str(body).map_err(|e| ModelError::Malformed {
        detail: format!("{e}: {}", preview(raw)),
    })
}

fn preview(raw: &str) -> String {
    let p: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        format!("{p}…")
    } else {
        p
    }
}
