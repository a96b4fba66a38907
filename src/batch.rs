//! Batch orchestration: the library's entry points.
//!
//! [`BatchOrchestrator`] drives every document of a batch through
//! detection, extraction and classification concurrently, then either
//! analyses each classified document ([`BatchOrchestrator::run_individual`])
//! or synthesises across all of them
//! ([`BatchOrchestrator::run_consolidated`]).
//!
//! A per-document failure is recorded on that document and never aborts
//! its siblings. Only the upload boundary, an overall deadline and the
//! consolidated step itself fail a whole batch.

use crate::config::PipelineConfig;
use crate::document::{Document, DocumentState, ExtractionOutcome, SourceDocument};
use crate::error::DoclensError;
use crate::output::{BatchJob, ConsolidatedOutput, DocumentReport, IndividualOutput};
use crate::pipeline::analyze::DocumentAnalyzer;
use crate::pipeline::classify::DocumentClassifier;
use crate::pipeline::consolidate::ConsolidatedAnalyzer;
use crate::pipeline::detect::{self, check_extension};
use crate::pipeline::strategy::ExtractionStrategySelector;
use crate::providers::Providers;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a batch is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// One report per document.
    Individual,
    /// One synthesis across every classified document.
    Consolidated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchOutput {
    Individual(IndividualOutput),
    Consolidated(ConsolidatedOutput),
}

/// Check a batch at the upload boundary, before any work starts.
pub fn validate_batch(sources: &[SourceDocument], max_batch_size: usize) -> Result<(), DoclensError> {
    if sources.is_empty() {
        return Err(DoclensError::EmptyBatch);
    }
    if sources.len() > max_batch_size {
        return Err(DoclensError::TooManyDocuments {
            count: sources.len(),
            max: max_batch_size,
        });
    }
    for source in sources {
        if let Err(extension) = check_extension(&source.filename) {
            return Err(DoclensError::UnsupportedFormat {
                filename: source.filename.clone(),
                extension,
            });
        }
    }
    Ok(())
}

/// Give exact duplicates (same name, same bytes) distinct ids: the first
/// keeps its id, later copies get `-2`, `-3`, ...
pub fn assign_unique_ids(sources: &mut [SourceDocument]) {
    let mut seen: HashMap<_, usize> = HashMap::new();
    for source in sources.iter_mut() {
        let count = seen.entry(source.id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let id = source.id.with_suffix(*count);
            debug!("Duplicate upload {}; renamed to {}", source.filename, id);
            source.id = id;
        }
    }
}

/// Runs batches against one config and one set of providers.
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: Arc<PipelineConfig>,
    selector: ExtractionStrategySelector,
    classifier: Arc<DocumentClassifier>,
    analyzer: Arc<DocumentAnalyzer>,
    consolidator: Arc<ConsolidatedAnalyzer>,
}

impl BatchOrchestrator {
    pub fn new(config: PipelineConfig, providers: Providers) -> Self {
        let selector = ExtractionStrategySelector::from_config(
            &config,
            Arc::clone(&providers.native),
            providers.ocr.clone(),
        );
        let model = providers.language_model;
        Self {
            selector,
            classifier: Arc::new(DocumentClassifier::from_config(&config, Arc::clone(&model))),
            analyzer: Arc::new(DocumentAnalyzer::from_config(&config, Arc::clone(&model))),
            consolidator: Arc::new(ConsolidatedAnalyzer::from_config(&config, model)),
            config: Arc::new(config),
        }
    }

    /// Resolve providers from the environment and build an orchestrator.
    pub async fn from_env(config: PipelineConfig) -> Result<Self, DoclensError> {
        let providers = Providers::resolve(&config).await?;
        Ok(Self::new(config, providers))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Drive one document to a terminal state.
    ///
    /// Per-document failures are recorded on the returned [`Document`].
    /// `Err` only signals an illegal state transition, which is a bug.
    pub async fn process_document(&self, source: SourceDocument) -> Result<Document, DoclensError> {
        let SourceDocument {
            id,
            filename,
            bytes,
        } = source;
        let mut doc = Document::pending(id, filename);
        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_document_start(doc.id(), doc.filename());
        }

        match detect::detect(doc.filename(), &bytes) {
            Ok(format) => {
                doc.begin_extraction(Some(&format))?;
                info!(
                    "{} [{}]: detected {} via {:?}",
                    doc.filename(),
                    doc.id(),
                    format.kind,
                    format.source
                );
                let payload: Arc<[u8]> = Arc::from(bytes);
                let outcome = self.selector.extract(&format, payload).await;
                doc.record_extraction(outcome)?;
            }
            Err(reason) => {
                doc.begin_extraction(None)?;
                doc.record_extraction(ExtractionOutcome::Failed { reason })?;
            }
        }

        if doc.state() == DocumentState::Extracted {
            doc.begin_classification()?;
            let result = self.classifier.classify(doc.filename(), doc.text()).await;
            doc.record_classification(result)?;
        }

        match doc.error() {
            None => {
                info!(
                    "{} [{}]: {} via {}",
                    doc.filename(),
                    doc.id(),
                    doc.document_type().map(|t| t.as_str()).unwrap_or("?"),
                    doc.extraction_method().map(|m| m.as_str()).unwrap_or("?")
                );
                if let Some(cb) = callback {
                    cb.on_document_complete(doc.id(), doc.filename(), doc.text().chars().count());
                }
            }
            Some(e) => {
                warn!("{} [{}]: {}", doc.filename(), doc.id(), e);
                if let Some(cb) = callback {
                    cb.on_document_error(doc.id(), doc.filename(), &e.to_string());
                }
            }
        }
        Ok(doc)
    }

    /// Validate, then process every document concurrently. Returned in
    /// submission order.
    async fn run_documents(&self, mut sources: Vec<SourceDocument>) -> Result<Vec<Document>, DoclensError> {
        validate_batch(&sources, self.config.max_batch_size)?;
        assign_unique_ids(&mut sources);
        let total = sources.len();
        info!(
            "Processing batch of {} document(s), concurrency {}",
            total, self.config.concurrency
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut indexed: Vec<(usize, Result<Document, DoclensError>)> =
            stream::iter(sources.into_iter().enumerate().map(|(idx, source)| async move {
                (idx, self.process_document(source).await)
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let documents = indexed
            .into_iter()
            .map(|(_, doc)| doc)
            .collect::<Result<Vec<_>, _>>()?;

        let succeeded = documents.iter().filter(|d| d.succeeded()).count();
        info!("Batch complete: {}/{} documents classified", succeeded, total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, succeeded);
        }
        Ok(documents)
    }

    async fn attach_analyses(&self, documents: Vec<Document>) -> Result<Vec<Document>, DoclensError> {
        let mut indexed: Vec<(usize, Result<Document, DoclensError>)> =
            stream::iter(documents.into_iter().enumerate().map(|(idx, mut doc)| async move {
                if !doc.succeeded() {
                    return (idx, Ok(doc));
                }
                let label = doc.document_type().map(|t| t.as_str()).unwrap_or_default();
                let result = self
                    .analyzer
                    .analyze(doc.filename(), label, doc.text())
                    .await
                    .map_err(|e| {
                        warn!("{}: analysis failed: {}", doc.filename(), e);
                        e.to_string()
                    });
                let attached = doc.attach_analysis(result).map(|_| doc);
                (idx, attached)
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, doc)| doc).collect()
    }

    /// Apply the configured overall deadline, if any.
    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, DoclensError>>,
    ) -> Result<T, DoclensError> {
        match self.config.batch_timeout_secs {
            None => fut.await,
            Some(secs) => tokio::time::timeout(std::time::Duration::from_secs(secs), fut)
                .await
                .map_err(|_| {
                    warn!("Batch exceeded its {}s deadline", secs);
                    DoclensError::BatchTimeout { secs }
                })?,
        }
    }

    /// Extract and classify every document. No analysis.
    pub async fn process_batch(&self, sources: Vec<SourceDocument>) -> Result<BatchJob, DoclensError> {
        let start = Instant::now();
        let documents = self.with_deadline(self.run_documents(sources)).await?;
        Ok(BatchJob::from_documents(documents, start.elapsed().as_millis() as u64))
    }

    /// Individual mode: one report per document, in submission order.
    pub async fn run_individual(&self, sources: Vec<SourceDocument>) -> Result<IndividualOutput, DoclensError> {
        let start = Instant::now();
        let documents = self
            .with_deadline(async {
                let documents = self.run_documents(sources).await?;
                if self.config.analyze_documents {
                    self.attach_analyses(documents).await
                } else {
                    Ok(documents)
                }
            })
            .await?;
        let job = BatchJob::from_documents(documents, start.elapsed().as_millis() as u64);
        Ok(IndividualOutput::from_job(&job, self.config.text_preview_chars))
    }

    /// Consolidated mode: waits for every document, then one synthesis.
    pub async fn run_consolidated(
        &self,
        sources: Vec<SourceDocument>,
    ) -> Result<ConsolidatedOutput, DoclensError> {
        let start = Instant::now();
        let (documents, analysis) = self
            .with_deadline(async {
                let documents = self.run_documents(sources).await?;
                let analysis = self.consolidator.analyze(&documents).await?;
                Ok((documents, analysis))
            })
            .await?;
        let job = BatchJob::from_documents(documents, start.elapsed().as_millis() as u64);
        Ok(ConsolidatedOutput::new(
            &job,
            analysis,
            self.config.text_preview_chars,
        ))
    }

    pub async fn run(
        &self,
        mode: AnalysisMode,
        sources: Vec<SourceDocument>,
    ) -> Result<BatchOutput, DoclensError> {
        match mode {
            AnalysisMode::Individual => self.run_individual(sources).await.map(BatchOutput::Individual),
            AnalysisMode::Consolidated => self
                .run_consolidated(sources)
                .await
                .map(BatchOutput::Consolidated),
        }
    }

    /// Process and analyse a single document.
    pub async fn analyze_single(&self, source: SourceDocument) -> Result<DocumentReport, DoclensError> {
        let output = self.run_individual(vec![source]).await?;
        output
            .results
            .into_iter()
            .next()
            .ok_or_else(|| DoclensError::Internal("single-document batch produced no report".into()))
    }
}
