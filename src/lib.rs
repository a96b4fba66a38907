//! # edgequake-doclens
//!
//! Extract, classify and analyse batches of business documents with LLMs.
//!
//! ## Why this crate?
//!
//! Uploaded documents come in two flavours: files with a digital text layer
//! (most PDFs, DOCX, CSV, XLSX) and files that are really pictures (scanned
//! PDFs, phone photos of receipts). Sending everything through a vision
//! model is slow and expensive; reading text layers only misses every scan.
//! This crate reads the text layer first and falls back to OCR only when a
//! PDF's text layer is too thin to be real.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files (≤ 10)
//!  │
//!  ├─ 1. Detect    extension first, content signature as fallback
//!  ├─ 2. Extract   native (pdfium, docx-rs, csv, calamine) or OCR (vision LLM)
//!  ├─ 3. Classify  Invoice | BalanceSheet | ProfitAndLossStatement | Contract | GeneralDocument
//!  └─ 4. Analyse   per document, or one consolidated synthesis across the batch
//! ```
//!
//! Documents run concurrently and fail independently: a corrupt file or a
//! scan with no OCR available ends in a failed state with a reason, and its
//! siblings carry on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doclens::{BatchOrchestrator, PipelineConfig, SourceDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let orchestrator = BatchOrchestrator::from_env(PipelineConfig::default()).await?;
//!     let docs = vec![
//!         SourceDocument::new("invoice.pdf", std::fs::read("invoice.pdf")?),
//!         SourceDocument::new("ledger.xlsx", std::fs::read("ledger.xlsx")?),
//!     ];
//!     let output = orchestrator.run_consolidated(docs).await?;
//!     println!("{}", output.analysis.summary);
//!     for r in &output.analysis.recommendations {
//!         println!("- {r}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doclens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doclens = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod stream;
pub mod testing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{AnalysisMode, BatchOrchestrator, BatchOutput};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{
    Classification, Document, DocumentId, DocumentKind, DocumentState, DocumentType,
    ExtractionMethod, ExtractionOutcome, ExtractionStatus, ExtractionStrategy, SourceDocument,
};
pub use error::{DoclensError, DocumentError};
pub use output::{
    BatchJob, ConsolidatedOutput, ConsolidatedResult, DocumentReport, ExcludedDocument,
    IncludedDocument, IndividualOutput, ReportStatus,
};
pub use pipeline::analyze::DocumentAnalysis;
pub use pipeline::detect::{DetectedFormat, DetectionSource};
pub use pipeline::llm::{LanguageModel, ModelError, ModelRequest, ResponseShape};
pub use pipeline::native::{NativeExtractor, NativeText, StandardExtractor};
pub use pipeline::ocr::{OcrEngine, OcrError, OcrOutput, OcrRequest};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use providers::Providers;
pub use stream::{process_stream, DocumentStream};
