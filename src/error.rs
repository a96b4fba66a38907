//! Error types for the edgequake-doclens library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DoclensError`] is **fatal**. The batch cannot proceed at all (empty
//!   upload, too many files, unsupported extension at the upload boundary,
//!   provider not configured, nothing viable to consolidate). Returned as
//!   `Err(DoclensError)` from the [`crate::batch::BatchOrchestrator`] entry
//!   points.
//!
//! * [`DocumentError`] is **non-fatal**. One document failed extraction or
//!   classification but every other document in the batch is unaffected.
//!   Stored on the document's terminal record ([`crate::document::Document`])
//!   so callers can inspect partial success instead of losing the batch.

use crate::document::{DocumentId, DocumentState};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doclens library.
///
/// Per-document failures use [`DocumentError`] and never surface here,
/// with one exception: [`DoclensError::NoViableDocuments`] is raised when
/// *every* document failed and a consolidated analysis was requested.
#[derive(Debug, Error)]
pub enum DoclensError {
    // ── Upload boundary ───────────────────────────────────────────────────
    /// The batch contained no documents.
    #[error("No documents were submitted")]
    EmptyBatch,

    /// The batch exceeds the configured upload cap.
    #[error("Too many documents: {count} submitted, at most {max} allowed per batch")]
    TooManyDocuments { count: usize, max: usize },

    /// A submitted filename carries an extension the pipeline cannot handle.
    #[error("Unsupported file '{filename}': extension '.{extension}' is not one of pdf, docx, csv, xlsx, png, jpg, jpeg")]
    UnsupportedFormat { filename: String, extension: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Batch outcome errors ──────────────────────────────────────────────
    /// Consolidated mode was requested but no document reached `Classified`.
    #[error("No viable documents to consolidate: all {total} documents failed ({excluded})")]
    NoViableDocuments { total: usize, excluded: String },

    /// The consolidated model call failed or returned an unusable response.
    #[error("Consolidated analysis failed: {detail}")]
    ConsolidationFailed { detail: String },

    /// The overall batch deadline elapsed before every document finished.
    #[error("Batch did not finish within {secs}s; in-flight documents were cancelled")]
    BatchTimeout { secs: u64 },

    /// A document was driven through an illegal lifecycle transition.
    #[error("Document {document}: illegal transition {from:?} → {to:?}")]
    InvalidTransition {
        document: DocumentId,
        from: DocumentState,
        to: DocumentState,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Attached to the document's terminal state. The batch continues.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DocumentError {
    /// Neither the extension nor the content signature matched a known kind.
    #[error("Unsupported format: {detail}")]
    UnsupportedFormat { detail: String },

    /// The native parser rejected the payload (corrupt or malformed file).
    #[error("Extraction failed: {cause}")]
    ExtractionFailure { cause: String },

    /// Extraction ran but produced too little text to be useful.
    /// `required` is the minimum character count that would have passed.
    #[error("Insufficient text: {chars} characters extracted, at least {required} required")]
    InsufficientText { chars: usize, required: usize },

    /// OCR was needed but no OCR provider is configured or reachable.
    #[error("OCR required but no OCR provider is available")]
    OcrUnavailable,

    /// The OCR provider did not answer within the configured timeout.
    #[error("OCR timed out after {secs}s")]
    OcrTimeout { secs: u64 },

    /// The language model failed or answered outside the label vocabulary.
    #[error("Classification failed: {detail}")]
    ClassificationFailure { detail: String },
}

impl DocumentError {
    /// Stable machine-readable code, identical to the serialised `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::UnsupportedFormat { .. } => "unsupported_format",
            DocumentError::ExtractionFailure { .. } => "extraction_failure",
            DocumentError::InsufficientText { .. } => "insufficient_text",
            DocumentError::OcrUnavailable => "ocr_unavailable",
            DocumentError::OcrTimeout { .. } => "ocr_timeout",
            DocumentError::ClassificationFailure { .. } => "classification_failure",
        }
    }
}
