//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves each document through extraction and
//! classification. Callers can forward them to a channel, a WebSocket or a
//! terminal progress bar; the library does not care which.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doclens::{BatchProgressCallback, DocumentId, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, id: &DocumentId, filename: &str, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id} {filename}: {chars} chars");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::document::DocumentId;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document.
///
/// Documents run concurrently, so `on_document_*` may be called from
/// several tasks at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the upload boundary accepted the batch.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document enters extraction.
    fn on_document_start(&self, id: &DocumentId, filename: &str) {
        let _ = (id, filename);
    }

    /// Called when a document reaches `Classified`.
    ///
    /// `chars` is the length of the extracted text.
    fn on_document_complete(&self, id: &DocumentId, filename: &str, chars: usize) {
        let _ = (id, filename, chars);
    }

    /// Called when a document reaches a failed terminal state.
    fn on_document_error(&self, id: &DocumentId, filename: &str, error: &str) {
        let _ = (id, filename, error);
    }

    /// Called once every document is terminal.
    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let _ = (total_documents, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
