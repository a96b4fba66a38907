//! Streaming API: emit documents as they reach a terminal state.
//!
//! Unlike [`crate::batch::BatchOrchestrator::run_individual`], which returns
//! only after every document finishes, [`process_stream`] yields each
//! [`Document`] in completion order. Sort by position or id if order
//! matters. No analysis runs on this path; classified documents carry a
//! label but no [`crate::pipeline::analyze::DocumentAnalysis`].

use crate::batch::{assign_unique_ids, validate_batch, BatchOrchestrator};
use crate::document::{Document, SourceDocument};
use crate::error::DoclensError;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of terminal documents.
pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<Document, DoclensError>> + Send>>;

/// Process a batch, streaming documents as they complete.
///
/// # Returns
/// - `Ok(DocumentStream)` once the batch passed the upload boundary
/// - `Err(DoclensError)` when the batch is rejected up front
pub fn process_stream(
    orchestrator: &BatchOrchestrator,
    mut sources: Vec<SourceDocument>,
) -> Result<DocumentStream, DoclensError> {
    let config = orchestrator.config();
    validate_batch(&sources, config.max_batch_size)?;
    assign_unique_ids(&mut sources);
    info!("Streaming batch of {} document(s)", sources.len());

    let concurrency = config.concurrency;
    let orchestrator = orchestrator.clone();
    let s = stream::iter(sources.into_iter().map(move |source| {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.process_document(source).await }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
