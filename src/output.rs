//! Output types: the batch aggregate and the serialisable reports.
//!
//! [`BatchJob::from_documents`] is the only place the succeeded/failed
//! counters are computed, so they always sum to the batch size.

use crate::document::{
    Document, DocumentId, DocumentKind, DocumentState, DocumentType, ExtractionMethod,
};
use crate::error::DocumentError;
use crate::pipeline::analyze::DocumentAnalysis;
use crate::pipeline::classify::leading_window;
use serde::Serialize;

/// Every document of one batch, in submission order, plus counters.
#[derive(Debug, Clone, Serialize)]
pub struct BatchJob {
    pub documents: Vec<Document>,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl BatchJob {
    pub fn from_documents(documents: Vec<Document>, duration_ms: u64) -> Self {
        let succeeded = documents.iter().filter(|d| d.succeeded()).count();
        let failed = documents.len() - succeeded;
        Self {
            documents,
            succeeded,
            failed,
            duration_ms,
        }
    }

    pub fn total(&self) -> usize {
        self.documents.len()
    }

    pub fn all_terminal(&self) -> bool {
        self.documents.iter().all(Document::is_terminal)
    }

    pub fn classified(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().filter(|d| d.succeeded())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().filter(|d| !d.succeeded())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
}

/// Per-document result as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub id: DocumentId,
    pub filename: String,
    pub status: ReportStatus,
    pub state: DocumentState,
    pub kind: Option<DocumentKind>,
    pub document_type: Option<DocumentType>,
    pub extraction_method: Option<ExtractionMethod>,
    pub error: Option<DocumentError>,
    pub text_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<DocumentAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl DocumentReport {
    pub fn from_document(doc: &Document, preview_chars: usize) -> Self {
        let (preview, _) = leading_window(doc.text(), preview_chars);
        Self {
            id: doc.id().clone(),
            filename: doc.filename().to_string(),
            status: if doc.succeeded() {
                ReportStatus::Success
            } else {
                ReportStatus::Failed
            },
            state: doc.state(),
            kind: doc.kind(),
            document_type: doc.document_type(),
            extraction_method: doc.extraction_method(),
            error: doc.error().cloned(),
            text_preview: preview.to_string(),
            analysis: doc.analysis().cloned(),
            analysis_error: doc.analysis_error().map(str::to_string),
        }
    }
}

/// Individual-mode result.
#[derive(Debug, Clone, Serialize)]
pub struct IndividualOutput {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<DocumentReport>,
}

impl IndividualOutput {
    pub fn from_job(job: &BatchJob, preview_chars: usize) -> Self {
        Self {
            total_documents: job.total(),
            succeeded: job.succeeded,
            failed: job.failed,
            duration_ms: job.duration_ms,
            results: job
                .documents
                .iter()
                .map(|d| DocumentReport::from_document(d, preview_chars))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludedDocument {
    pub id: DocumentId,
    pub filename: String,
    pub document_type: DocumentType,
    pub extraction_method: ExtractionMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedDocument {
    pub id: DocumentId,
    pub filename: String,
    pub state: DocumentState,
    pub error: Option<DocumentError>,
    pub reason: String,
}

/// The synthesized corpus-level analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedResult {
    pub summary: String,
    pub key_findings: Vec<String>,
    /// Ordered, most important first.
    pub recommendations: Vec<String>,
    pub priority_actions: Vec<String>,
    /// Sorted by id.
    pub included_documents: Vec<IncludedDocument>,
    /// Sorted by id.
    pub excluded_documents: Vec<ExcludedDocument>,
    /// False when only one document contributed.
    pub cross_document: bool,
    pub notes: Vec<String>,
}

/// Consolidated-mode result: per-document reports plus the synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedOutput {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub documents: Vec<DocumentReport>,
    pub analysis: ConsolidatedResult,
}

impl ConsolidatedOutput {
    pub fn new(job: &BatchJob, analysis: ConsolidatedResult, preview_chars: usize) -> Self {
        let individual = IndividualOutput::from_job(job, preview_chars);
        Self {
            total_documents: individual.total_documents,
            succeeded: individual.succeeded,
            failed: individual.failed,
            duration_ms: individual.duration_ms,
            documents: individual.results,
            analysis,
        }
    }
}
