//! In-memory stand-ins for the model, OCR and native capabilities.
//!
//! Public so integration tests and downstream crates can drive the whole
//! pipeline offline. None of these touch the network or pdfium unless a
//! [`FakeNative`] falls through to [`StandardExtractor`].

use crate::document::DocumentKind;
use crate::error::DocumentError;
use crate::pipeline::llm::{LanguageModel, ModelError, ModelRequest, ResponseShape};
use crate::pipeline::native::{NativeExtractor, NativeText, StandardExtractor};
use crate::pipeline::ocr::{OcrEngine, OcrError, OcrOutput, OcrRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ── Language model ───────────────────────────────────────────────────────

const DEFAULT_CLASSIFICATION: &str =
    r#"{"document_type": "GeneralDocument", "rationale": "No specific document markers found"}"#;

const DEFAULT_ANALYSIS: &str = r#"{
  "language": "English",
  "summary": "The document contains general business information.",
  "recommendations": ["File the document with the related records"],
  "key_details": {}
}"#;

const DEFAULT_CONSOLIDATED: &str = r#"{
  "summary": "The documents describe related business activity.",
  "key_findings": ["The documents reference the same counterparty"],
  "recommendations": ["Reconcile the amounts across the documents"],
  "priority_actions": ["Confirm outstanding balances"]
}"#;

struct Rule {
    shape: ResponseShape,
    needle: String,
    raw: String,
}

/// A [`LanguageModel`] that answers from a script.
///
/// Lookup order for a request: the first `respond_when` rule whose needle
/// occurs in the prompt, then the `respond` override for the shape, then a
/// valid default for the shape. Shapes marked with `fail_shape` always fail.
pub struct ScriptedModel {
    rules: Vec<Rule>,
    overrides: HashMap<ResponseShape, String>,
    failing: HashSet<ResponseShape>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            overrides: HashMap::new(),
            failing: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, shape: ResponseShape, raw: &str) -> Self {
        self.overrides.insert(shape, raw.to_string());
        self
    }

    pub fn respond_when(mut self, shape: ResponseShape, needle: &str, raw: &str) -> Self {
        self.rules.push(Rule {
            shape,
            needle: needle.to_string(),
            raw: raw.to_string(),
        });
        self
    }

    pub fn fail_shape(mut self, shape: ResponseShape) -> Self {
        self.failing.insert(shape);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self, shape: ResponseShape) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|q| q.shape == shape).count())
            .unwrap_or(0)
    }

    fn answer(&self, request: &ModelRequest) -> String {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.shape == request.shape && request.prompt.contains(&r.needle))
        {
            return rule.raw.clone();
        }
        if let Some(raw) = self.overrides.get(&request.shape) {
            return raw.clone();
        }
        match request.shape {
            ResponseShape::Classification => DEFAULT_CLASSIFICATION,
            ResponseShape::DocumentAnalysis => DEFAULT_ANALYSIS,
            ResponseShape::Consolidated => DEFAULT_CONSOLIDATED,
        }
        .to_string()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if self.failing.contains(&request.shape) {
            return Err(ModelError::Provider {
                attempts: 1,
                detail: format!("scripted failure for {}", request.shape.as_str()),
            });
        }
        Ok(self.answer(request))
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

enum OcrBehaviour {
    Return(String),
    Fail(String),
    Unavailable(String),
    Slow(String, Duration),
}

/// An [`OcrEngine`] with fixed behaviour and a call counter.
pub struct FakeOcr {
    behaviour: OcrBehaviour,
    calls: AtomicUsize,
    hints: Mutex<Vec<Option<String>>>,
}

impl FakeOcr {
    fn with(behaviour: OcrBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(text: &str) -> Self {
        Self::with(OcrBehaviour::Return(text.to_string()))
    }

    pub fn failing(detail: &str) -> Self {
        Self::with(OcrBehaviour::Fail(detail.to_string()))
    }

    pub fn unavailable(reason: &str) -> Self {
        Self::with(OcrBehaviour::Unavailable(reason.to_string()))
    }

    /// Returns `text` after sleeping for `delay`.
    pub fn slow(text: &str, delay: Duration) -> Self {
        Self::with(OcrBehaviour::Slow(text.to_string(), delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The region hint of every request received, in arrival order.
    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

fn output(text: &str) -> OcrOutput {
    OcrOutput {
        text: text.to_string(),
        confidence: Some(1.0),
        pages: 1,
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    async fn recognize(&self, request: OcrRequest) -> Result<OcrOutput, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut hints) = self.hints.lock() {
            hints.push(request.region_hint);
        }
        match &self.behaviour {
            OcrBehaviour::Return(text) => Ok(output(text)),
            OcrBehaviour::Fail(detail) => Err(OcrError::Failed {
                detail: detail.clone(),
            }),
            OcrBehaviour::Unavailable(reason) => Err(OcrError::Unavailable {
                reason: reason.clone(),
            }),
            OcrBehaviour::Slow(text, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(output(text))
            }
        }
    }
}

// ── Native extraction ────────────────────────────────────────────────────

/// A [`NativeExtractor`] with per-kind canned results. Kinds without an
/// entry go to [`StandardExtractor`], so real CSV/DOCX/XLSX bytes still work.
#[derive(Default)]
pub struct FakeNative {
    canned: HashMap<DocumentKind, Result<NativeText, DocumentError>>,
}

impl FakeNative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, kind: DocumentKind, text: &str, page_count: usize) -> Self {
        self.canned.insert(
            kind,
            Ok(NativeText {
                text: text.to_string(),
                page_count,
            }),
        );
        self
    }

    pub fn with_failure(mut self, kind: DocumentKind, cause: &str) -> Self {
        self.canned.insert(
            kind,
            Err(DocumentError::ExtractionFailure {
                cause: cause.to_string(),
            }),
        );
        self
    }
}

impl NativeExtractor for FakeNative {
    fn extract(&self, kind: DocumentKind, bytes: &[u8]) -> Result<NativeText, DocumentError> {
        match self.canned.get(&kind) {
            Some(result) => result.clone(),
            None => StandardExtractor.extract(kind, bytes),
        }
    }
}
