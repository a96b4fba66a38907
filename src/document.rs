//! Per-document data model and lifecycle.
//!
//! A [`SourceDocument`] is what the caller submits: a filename and the raw
//! bytes. The pipeline moves it into the per-document task, extracts text
//! from it, and drops the payload as soon as extraction finishes. What
//! survives is a [`Document`]: the identity, the detected kind, the extracted
//! text, and the outcome of each stage.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ─▶ Extracting ─┬─▶ ExtractionFailed                      (terminal)
//!                        └─▶ Extracted ─▶ Classifying ─┬─▶ Classified           (terminal)
//!                                                      └─▶ ClassificationFailed (terminal)
//! ```
//!
//! Fields are private; every state change goes through a `begin_*` /
//! `record_*` method which rejects out-of-order calls with
//! [`DoclensError::InvalidTransition`].

use crate::error::{DoclensError, DocumentError};
use crate::pipeline::analyze::DocumentAnalysis;
use crate::pipeline::detect::DetectedFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ── Identity ─────────────────────────────────────────────────────────────

/// Batch-local document identity.
///
/// The default id is derived from the filename and content, so the same
/// upload keeps the same id regardless of its position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `doc-` followed by the first 12 hex digits of SHA-256(filename ‖ 0x00 ‖ bytes).
    pub fn from_content(filename: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filename.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        let digest = hex::encode(hasher.finalize());
        Self(format!("doc-{}", &digest[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A copy of this id with a numeric suffix, used to split exact duplicates.
    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{}", self.0, n))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Kinds and strategies ─────────────────────────────────────────────────

/// The document kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Csv,
    Xlsx,
    Image,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Csv => "csv",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Image => "image",
        }
    }

    /// Default extraction strategy for this kind.
    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            DocumentKind::Csv | DocumentKind::Xlsx | DocumentKind::Docx => {
                ExtractionStrategy::NativeOnly
            }
            DocumentKind::Pdf => ExtractionStrategy::NativeWithOcrFallback,
            DocumentKind::Image => ExtractionStrategy::OcrOnly,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    NativeOnly,
    OcrOnly,
    NativeWithOcrFallback,
}

/// Which path produced a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Native => "native",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Result of the extraction stage. Exactly one of text or reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted {
        text: String,
        method: ExtractionMethod,
    },
    Failed {
        reason: DocumentError,
    },
}

impl ExtractionOutcome {
    pub fn is_extracted(&self) -> bool {
        matches!(self, ExtractionOutcome::Extracted { .. })
    }

    pub fn method(&self) -> Option<ExtractionMethod> {
        match self {
            ExtractionOutcome::Extracted { method, .. } => Some(*method),
            ExtractionOutcome::Failed { .. } => None,
        }
    }
}

// ── Classification ───────────────────────────────────────────────────────

/// The fixed label vocabulary a document can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Invoice,
    BalanceSheet,
    ProfitAndLossStatement,
    Contract,
    GeneralDocument,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Invoice,
        DocumentType::BalanceSheet,
        DocumentType::ProfitAndLossStatement,
        DocumentType::Contract,
        DocumentType::GeneralDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::BalanceSheet => "BalanceSheet",
            DocumentType::ProfitAndLossStatement => "ProfitAndLossStatement",
            DocumentType::Contract => "Contract",
            DocumentType::GeneralDocument => "GeneralDocument",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    /// Case-insensitive; spaces, `_` and `-` are ignored
    /// (`"balance sheet"`, `"BALANCE_SHEET"` and `"BalanceSheet"` all match).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str().to_lowercase() == key)
            .ok_or_else(|| format!("label '{}' is not in the vocabulary", s.trim()))
    }
}

/// A label plus the model's stated reason for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: DocumentType,
    #[serde(default)]
    pub rationale: String,
}

// ── Submission ───────────────────────────────────────────────────────────

/// One uploaded file: name plus payload.
#[derive(Clone)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Create a source document with a content-derived id.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let bytes = bytes.into();
        let id = DocumentId::from_content(&filename, &bytes);
        Self {
            id,
            filename,
            bytes,
        }
    }

    /// Override the content-derived id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = DocumentId::new(id);
        self
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Pending,
    Extracting,
    Extracted,
    ExtractionFailed,
    Classifying,
    Classified,
    ClassificationFailed,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentState::ExtractionFailed
                | DocumentState::Classified
                | DocumentState::ClassificationFailed
        )
    }

    pub fn can_transition_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, Extracted)
                | (Extracting, ExtractionFailed)
                | (Extracted, Classifying)
                | (Classifying, Classified)
                | (Classifying, ClassificationFailed)
        )
    }
}

/// The pipeline's record of one document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    id: DocumentId,
    filename: String,
    kind: Option<DocumentKind>,
    mime_type: Option<String>,
    state: DocumentState,
    extraction_method: Option<ExtractionMethod>,
    #[serde(skip)]
    text: String,
    classification: Option<Classification>,
    error: Option<DocumentError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<DocumentAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_error: Option<String>,
}

impl Document {
    pub fn pending(id: DocumentId, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            kind: None,
            mime_type: None,
            state: DocumentState::Pending,
            extraction_method: None,
            text: String::new(),
            classification: None,
            error: None,
            analysis: None,
            analysis_error: None,
        }
    }

    fn transition(&mut self, next: DocumentState) -> Result<(), DoclensError> {
        if !self.state.can_transition_to(next) {
            return Err(DoclensError::InvalidTransition {
                document: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// `Pending → Extracting`. The detected format is recorded when known.
    pub fn begin_extraction(&mut self, format: Option<&DetectedFormat>) -> Result<(), DoclensError> {
        self.transition(DocumentState::Extracting)?;
        if let Some(f) = format {
            self.kind = Some(f.kind);
            self.mime_type = Some(f.mime_type.clone());
        }
        Ok(())
    }

    /// `Extracting → Extracted | ExtractionFailed`.
    pub fn record_extraction(&mut self, outcome: ExtractionOutcome) -> Result<(), DoclensError> {
        match outcome {
            ExtractionOutcome::Extracted { text, method } => {
                self.transition(DocumentState::Extracted)?;
                self.text = text;
                self.extraction_method = Some(method);
            }
            ExtractionOutcome::Failed { reason } => {
                self.transition(DocumentState::ExtractionFailed)?;
                self.error = Some(reason);
            }
        }
        Ok(())
    }

    /// `Extracted → Classifying`.
    pub fn begin_classification(&mut self) -> Result<(), DoclensError> {
        self.transition(DocumentState::Classifying)
    }

    /// `Classifying → Classified | ClassificationFailed`.
    pub fn record_classification(
        &mut self,
        result: Result<Classification, DocumentError>,
    ) -> Result<(), DoclensError> {
        match result {
            Ok(c) => {
                self.transition(DocumentState::Classified)?;
                self.classification = Some(c);
            }
            Err(e) => {
                self.transition(DocumentState::ClassificationFailed)?;
                self.error = Some(e);
            }
        }
        Ok(())
    }

    /// Attach the per-document analysis. Only a classified document can
    /// carry one; the state does not change.
    pub fn attach_analysis(
        &mut self,
        result: Result<DocumentAnalysis, String>,
    ) -> Result<(), DoclensError> {
        if self.state != DocumentState::Classified {
            return Err(DoclensError::InvalidTransition {
                document: self.id.clone(),
                from: self.state,
                to: DocumentState::Classified,
            });
        }
        match result {
            Ok(a) => self.analysis = Some(a),
            Err(e) => self.analysis_error = Some(e),
        }
        Ok(())
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.kind
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn extraction_status(&self) -> ExtractionStatus {
        match self.state {
            DocumentState::Pending | DocumentState::Extracting => ExtractionStatus::Pending,
            DocumentState::ExtractionFailed => ExtractionStatus::Failed,
            _ => ExtractionStatus::Succeeded,
        }
    }

    pub fn extraction_method(&self) -> Option<ExtractionMethod> {
        self.extraction_method
    }

    /// Extracted text; empty unless extraction succeeded.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        self.classification.as_ref().map(|c| c.label)
    }

    pub fn error(&self) -> Option<&DocumentError> {
        self.error.as_ref()
    }

    pub fn analysis(&self) -> Option<&DocumentAnalysis> {
        self.analysis.as_ref()
    }

    pub fn analysis_error(&self) -> Option<&str> {
        self.analysis_error.as_deref()
    }

    /// A document succeeded when it reached `Classified`.
    pub fn succeeded(&self) -> bool {
        self.state == DocumentState::Classified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detect::DetectionSource;

    fn pdf_format() -> DetectedFormat {
        DetectedFormat {
            kind: DocumentKind::Pdf,
            mime_type: "application/pdf".into(),
            source: DetectionSource::Extension,
        }
    }

    #[test]
    fn content_id_is_stable_and_prefixed() {
        let a = DocumentId::from_content("a.csv", b"x,y\n1,2\n");
        let b = DocumentId::from_content("a.csv", b"x,y\n1,2\n");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("doc-"));
        assert_eq!(a.as_str().len(), "doc-".len() + 12);
    }

    #[test]
    fn content_id_depends_on_filename_and_bytes() {
        let base = DocumentId::from_content("a.csv", b"1");
        assert_ne!(base, DocumentId::from_content("b.csv", b"1"));
        assert_ne!(base, DocumentId::from_content("a.csv", b"2"));
    }

    #[test]
    fn strategy_per_kind() {
        assert_eq!(DocumentKind::Csv.strategy(), ExtractionStrategy::NativeOnly);
        assert_eq!(DocumentKind::Xlsx.strategy(), ExtractionStrategy::NativeOnly);
        assert_eq!(DocumentKind::Docx.strategy(), ExtractionStrategy::NativeOnly);
        assert_eq!(DocumentKind::Image.strategy(), ExtractionStrategy::OcrOnly);
        assert_eq!(
            DocumentKind::Pdf.strategy(),
            ExtractionStrategy::NativeWithOcrFallback
        );
    }

    #[test]
    fn document_type_parsing_is_lenient_on_case_and_separators() {
        assert_eq!("invoice".parse::<DocumentType>(), Ok(DocumentType::Invoice));
        assert_eq!(
            "Balance Sheet".parse::<DocumentType>(),
            Ok(DocumentType::BalanceSheet)
        );
        assert_eq!(
            "PROFIT_AND_LOSS_STATEMENT".parse::<DocumentType>(),
            Ok(DocumentType::ProfitAndLossStatement)
        );
        assert_eq!(
            "general-document".parse::<DocumentType>(),
            Ok(DocumentType::GeneralDocument)
        );
        assert!("Receipt".parse::<DocumentType>().is_err());
    }

    #[test]
    fn terminal_states() {
        use DocumentState::*;
        for s in [ExtractionFailed, Classified, ClassificationFailed] {
            assert!(s.is_terminal(), "{s:?}");
        }
        for s in [Pending, Extracting, Extracted, Classifying] {
            assert!(!s.is_terminal(), "{s:?}");
        }
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut doc = Document::pending(DocumentId::new("d1"), "report.pdf");
        assert_eq!(doc.extraction_status(), ExtractionStatus::Pending);

        doc.begin_extraction(Some(&pdf_format())).unwrap();
        doc.record_extraction(ExtractionOutcome::Extracted {
            text: "Revenue 100".into(),
            method: ExtractionMethod::Native,
        })
        .unwrap();
        assert_eq!(doc.extraction_status(), ExtractionStatus::Succeeded);
        assert_eq!(doc.extraction_method(), Some(ExtractionMethod::Native));

        doc.begin_classification().unwrap();
        doc.record_classification(Ok(Classification {
            label: DocumentType::Invoice,
            rationale: "has an invoice number".into(),
        }))
        .unwrap();
        assert!(doc.succeeded());
        assert!(doc.is_terminal());
        assert_eq!(doc.kind(), Some(DocumentKind::Pdf));
    }

    #[test]
    fn failed_extraction_leaves_method_unset() {
        let mut doc = Document::pending(DocumentId::new("d1"), "scan.png");
        doc.begin_extraction(None).unwrap();
        doc.record_extraction(ExtractionOutcome::Failed {
            reason: DocumentError::OcrUnavailable,
        })
        .unwrap();
        assert_eq!(doc.state(), DocumentState::ExtractionFailed);
        assert_eq!(doc.extraction_method(), None);
        assert_eq!(doc.error(), Some(&DocumentError::OcrUnavailable));
        assert!(doc.text().is_empty());
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut doc = Document::pending(DocumentId::new("d1"), "a.csv");
        let err = doc.begin_classification().unwrap_err();
        assert!(matches!(err, DoclensError::InvalidTransition { .. }));

        doc.begin_extraction(None).unwrap();
        doc.record_extraction(ExtractionOutcome::Failed {
            reason: DocumentError::OcrUnavailable,
        })
        .unwrap();
        // Extraction happens exactly once.
        assert!(doc
            .record_extraction(ExtractionOutcome::Extracted {
                text: "x".into(),
                method: ExtractionMethod::Native,
            })
            .is_err());
        assert!(doc.attach_analysis(Err("nope".into())).is_err());
    }

    #[test]
    fn source_debug_hides_payload() {
        let src = SourceDocument::new("a.csv", b"secret,data".to_vec()).with_id("custom");
        let dbg = format!("{src:?}");
        assert!(dbg.contains("custom"));
        assert!(!dbg.contains("secret"));
    }
}
