//! Offline integration tests for the batch pipeline.
//!
//! Every capability is faked ([`ScriptedModel`], [`FakeOcr`], [`FakeNative`])
//! except the real CSV/DOCX extractors, so these run without network access
//! or API keys. Tests that need pdfium skip themselves when it cannot be
//! bound.

mod common;

use edgequake_doclens::pipeline::render;
use edgequake_doclens::testing::{FakeNative, FakeOcr, ScriptedModel};
use edgequake_doclens::{
    AnalysisMode, BatchOrchestrator, BatchOutput, BatchProgressCallback, DoclensError,
    DocumentError, DocumentId, DocumentKind, DocumentState, DocumentType, ExtractionMethod,
    PipelineConfig, Providers, ReportStatus, ResponseShape, SourceDocument, process_stream,
};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

const RICH_PDF_TEXT: &str = "Profit and loss statement for the year ended 31 December 2024. \
Revenue 1,204,000. Cost of sales 610,000. Gross profit 594,000.";

fn orchestrator(
    config: PipelineConfig,
    model: &Arc<ScriptedModel>,
    native: FakeNative,
    ocr: Option<&Arc<FakeOcr>>,
) -> BatchOrchestrator {
    let mut providers = Providers::new(Arc::clone(model) as _).with_native(Arc::new(native));
    if let Some(ocr) = ocr {
        providers = providers.with_ocr(Arc::clone(ocr) as _);
    }
    BatchOrchestrator::new(config, providers)
}

fn default_config() -> PipelineConfig {
    PipelineConfig::builder().build().unwrap()
}

fn csv(name: &str, body: &str) -> SourceDocument {
    SourceDocument::new(name, body.as_bytes().to_vec())
}

fn classifying_model() -> ScriptedModel {
    ScriptedModel::new()
        .respond_when(
            ResponseShape::Classification,
            "INV-2024",
            r#"{"document_type": "Invoice", "rationale": "Invoice numbers and amounts"}"#,
        )
        .respond_when(
            ResponseShape::Classification,
            "Share capital",
            r#"{"document_type": "BalanceSheet", "rationale": "Debits and credits balance"}"#,
        )
        .respond_when(
            ResponseShape::Classification,
            "Profit and loss",
            r#"{"document_type": "ProfitAndLossStatement", "rationale": "Revenue and costs"}"#,
        )
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    batch_total: AtomicUsize,
    batch_succeeded: AtomicUsize,
}

impl BatchProgressCallback for CountingCallback {
    fn on_batch_start(&self, total: usize) {
        self.batch_total.store(total, Ordering::SeqCst);
    }
    fn on_document_start(&self, _id: &DocumentId, _filename: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_complete(&self, _id: &DocumentId, _filename: &str, _chars: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_error(&self, _id: &DocumentId, _filename: &str, _error: &str) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _total: usize, succeeded: usize) {
        self.batch_succeeded.store(succeeded, Ordering::SeqCst);
    }
}

// ── Extraction strategy per kind ─────────────────────────────────────────────

#[tokio::test]
async fn each_kind_uses_its_fixed_method() {
    let model = Arc::new(classifying_model());
    let ocr = Arc::new(FakeOcr::returning("RECEIPT Coffee 3.50 Total 3.50"));
    let orch = orchestrator(
        default_config(),
        &model,
        FakeNative::new().with_text(DocumentKind::Pdf, RICH_PDF_TEXT, 1),
        Some(&ocr),
    );

    let job = orch
        .process_batch(vec![
            csv("invoices.csv", common::INVOICE_CSV),
            SourceDocument::new("memo.docx", common::docx(&["Board memo", "Meeting on Friday"])),
            SourceDocument::new("pnl.pdf", b"%PDF-1.7 stub".to_vec()),
            SourceDocument::new("receipt.png", common::png()),
        ])
        .await
        .unwrap();

    let methods: Vec<_> = job.documents.iter().map(|d| d.extraction_method()).collect();
    assert_eq!(
        methods,
        vec![
            Some(ExtractionMethod::Native),
            Some(ExtractionMethod::Native),
            Some(ExtractionMethod::Native),
            Some(ExtractionMethod::Ocr),
        ]
    );
    assert_eq!(ocr.calls(), 1, "only the image should reach OCR");
    assert_eq!(job.succeeded, 4);
    assert_eq!(job.documents[0].document_type(), Some(DocumentType::Invoice));
    assert_eq!(
        job.documents[2].document_type(),
        Some(DocumentType::ProfitAndLossStatement)
    );
    assert!(job.documents[1].text().contains("Meeting on Friday"));
}

#[tokio::test]
async fn thin_pdf_text_layer_falls_back_to_ocr() {
    let model = Arc::new(ScriptedModel::new());
    let ocr = Arc::new(FakeOcr::returning("BALANCE SHEET Total assets 16,560.50"));
    let orch = orchestrator(
        default_config(),
        &model,
        FakeNative::new().with_text(DocumentKind::Pdf, "Page 1", 2),
        Some(&ocr),
    );

    let job = orch
        .process_batch(vec![SourceDocument::new("scan.pdf", b"%PDF-1.4".to_vec())])
        .await
        .unwrap();
    let doc = &job.documents[0];
    assert_eq!(doc.extraction_method(), Some(ExtractionMethod::Ocr));
    assert!(doc.text().contains("Total assets"));
    assert_eq!(ocr.calls(), 1);
}

#[tokio::test]
async fn generic_extension_is_detected_from_content() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(
        default_config(),
        &model,
        FakeNative::new().with_text(DocumentKind::Pdf, RICH_PDF_TEXT, 1),
        None,
    );
    let job = orch
        .process_batch(vec![
            SourceDocument::new("upload.bin", b"%PDF-1.7 body".to_vec()),
            SourceDocument::new("export", common::BALANCE_CSV.as_bytes().to_vec()),
        ])
        .await
        .unwrap();
    assert_eq!(job.documents[0].kind(), Some(DocumentKind::Pdf));
    assert_eq!(job.documents[1].kind(), Some(DocumentKind::Csv));
    assert_eq!(job.succeeded, 2);
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn failures_are_isolated_and_counted() {
    let model = Arc::new(ScriptedModel::new());
    let cb = Arc::new(CountingCallback::default());
    let config = PipelineConfig::builder()
        .progress_callback(Arc::clone(&cb) as _)
        .build()
        .unwrap();
    let orch = orchestrator(config, &model, FakeNative::new(), None);

    let job = orch
        .process_batch(vec![
            csv("good.csv", common::INVOICE_CSV),
            csv("ragged.csv", "a,b\n1,2,3\n"),
            SourceDocument::new("photo.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            SourceDocument::new("blob.dat", vec![0u8, 1, 2, 3, 4, 5]),
        ])
        .await
        .unwrap();

    assert_eq!(job.total(), 4);
    assert_eq!(job.succeeded, 1);
    assert_eq!(job.failed, 3);
    assert!(job.all_terminal());

    let names: Vec<_> = job.documents.iter().map(|d| d.filename()).collect();
    assert_eq!(names, vec!["good.csv", "ragged.csv", "photo.jpg", "blob.dat"]);

    let codes: Vec<_> = job
        .documents
        .iter()
        .map(|d| d.error().map(DocumentError::code))
        .collect();
    assert_eq!(
        codes,
        vec![
            None,
            Some("extraction_failure"),
            Some("ocr_unavailable"),
            Some("unsupported_format"),
        ]
    );
    for doc in &job.documents[1..] {
        assert_eq!(doc.state(), DocumentState::ExtractionFailed);
    }

    assert_eq!(cb.batch_total.load(Ordering::SeqCst), 4);
    assert_eq!(cb.started.load(Ordering::SeqCst), 4);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 1);
    assert_eq!(cb.errored.load(Ordering::SeqCst), 3);
    assert_eq!(cb.batch_succeeded.load(Ordering::SeqCst), 1);
    // Failed extractions never reach the classifier.
    assert_eq!(model.calls(ResponseShape::Classification), 1);
}

#[tokio::test]
async fn out_of_vocabulary_label_is_classification_failed() {
    let model = Arc::new(ScriptedModel::new().respond_when(
        ResponseShape::Classification,
        "receipts.csv",
        r#"{"document_type": "Receipt"}"#,
    ));
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let job = orch
        .process_batch(vec![
            csv("receipts.csv", common::INVOICE_CSV),
            csv("balance.csv", common::BALANCE_CSV),
        ])
        .await
        .unwrap();

    let receipts = &job.documents[0];
    assert_eq!(receipts.state(), DocumentState::ClassificationFailed);
    assert!(receipts.document_type().is_none());
    assert_eq!(
        receipts.error().map(DocumentError::code),
        Some("classification_failure")
    );
    // Extraction output survives a classification failure.
    assert_eq!(receipts.extraction_method(), Some(ExtractionMethod::Native));
    assert_eq!(job.documents[1].state(), DocumentState::Classified);
}

#[tokio::test]
async fn slow_ocr_times_out_without_affecting_siblings() {
    let model = Arc::new(ScriptedModel::new());
    let ocr = Arc::new(FakeOcr::slow("late", Duration::from_secs(30)));
    let config = PipelineConfig::builder().ocr_timeout_secs(1).build().unwrap();
    let orch = orchestrator(config, &model, FakeNative::new(), Some(&ocr));

    let job = orch
        .process_batch(vec![
            SourceDocument::new("scan.png", common::png()),
            csv("ledger.csv", common::BALANCE_CSV),
        ])
        .await
        .unwrap();
    assert_eq!(
        job.documents[0].error(),
        Some(&DocumentError::OcrTimeout { secs: 1 })
    );
    assert!(job.documents[1].succeeded());
}

#[tokio::test]
async fn batch_deadline_fails_the_whole_batch() {
    let model = Arc::new(ScriptedModel::new());
    let ocr = Arc::new(FakeOcr::slow("late", Duration::from_secs(30)));
    let config = PipelineConfig::builder()
        .ocr_timeout_secs(60)
        .batch_timeout_secs(1)
        .build()
        .unwrap();
    let orch = orchestrator(config, &model, FakeNative::new(), Some(&ocr));

    let err = orch
        .process_batch(vec![SourceDocument::new("scan.png", common::png())])
        .await
        .unwrap_err();
    assert!(matches!(err, DoclensError::BatchTimeout { secs: 1 }));
}

// ── Upload boundary ──────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_boundary_rejects_before_any_work() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);

    let err = orch.process_batch(vec![]).await.unwrap_err();
    assert!(matches!(err, DoclensError::EmptyBatch));

    let eleven = (0..11)
        .map(|i| csv(&format!("{i}.csv"), common::INVOICE_CSV))
        .collect();
    let err = orch.run_individual(eleven).await.unwrap_err();
    assert!(matches!(
        err,
        DoclensError::TooManyDocuments { count: 11, max: 10 }
    ));

    let err = orch
        .run_consolidated(vec![
            csv("a.csv", common::INVOICE_CSV),
            SourceDocument::new("notes.txt", b"hello".to_vec()),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, DoclensError::UnsupportedFormat { .. }));

    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn exact_duplicates_get_distinct_ids() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let job = orch
        .process_batch(vec![
            csv("a.csv", common::INVOICE_CSV),
            csv("a.csv", common::INVOICE_CSV),
        ])
        .await
        .unwrap();
    assert_ne!(job.documents[0].id(), job.documents[1].id());
    assert_eq!(job.succeeded, 2);
}

// ── Individual mode ──────────────────────────────────────────────────────────

#[tokio::test]
async fn individual_mode_attaches_analyses() {
    let model = Arc::new(classifying_model());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let out = orch
        .run_individual(vec![
            csv("invoices.csv", common::INVOICE_CSV),
            SourceDocument::new("photo.png", common::png()),
        ])
        .await
        .unwrap();

    assert_eq!(out.total_documents, 2);
    assert_eq!((out.succeeded, out.failed), (1, 1));
    let ok = &out.results[0];
    assert_eq!(ok.status, ReportStatus::Success);
    assert_eq!(ok.document_type, Some(DocumentType::Invoice));
    assert!(ok.analysis.is_some());
    assert!(ok.text_preview.contains("INV-2024-0042"));

    let failed = &out.results[1];
    assert_eq!(failed.status, ReportStatus::Failed);
    assert!(failed.analysis.is_none());
    assert_eq!(failed.error, Some(DocumentError::OcrUnavailable));
    assert_eq!(model.calls(ResponseShape::DocumentAnalysis), 1);
}

#[tokio::test]
async fn analysis_failure_keeps_the_document_successful() {
    let model = Arc::new(ScriptedModel::new().fail_shape(ResponseShape::DocumentAnalysis));
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let out = orch
        .run_individual(vec![csv("invoices.csv", common::INVOICE_CSV)])
        .await
        .unwrap();
    let r = &out.results[0];
    assert_eq!(r.status, ReportStatus::Success);
    assert!(r.analysis.is_none());
    assert!(r.analysis_error.is_some());
}

#[tokio::test]
async fn analysis_can_be_switched_off() {
    let model = Arc::new(ScriptedModel::new());
    let config = PipelineConfig::builder().analyze_documents(false).build().unwrap();
    let orch = orchestrator(config, &model, FakeNative::new(), None);
    orch.run_individual(vec![csv("invoices.csv", common::INVOICE_CSV)])
        .await
        .unwrap();
    assert_eq!(model.calls(ResponseShape::DocumentAnalysis), 0);
}

#[tokio::test]
async fn analyze_single_returns_one_report() {
    let model = Arc::new(classifying_model());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let report = orch
        .analyze_single(csv("balance.csv", common::BALANCE_CSV))
        .await
        .unwrap();
    assert_eq!(report.document_type, Some(DocumentType::BalanceSheet));
    assert_eq!(report.filename, "balance.csv");
}

// ── Consolidated mode ────────────────────────────────────────────────────────

#[tokio::test]
async fn consolidation_ignores_upload_order() {
    let batch = || {
        vec![
            csv("invoices.csv", common::INVOICE_CSV),
            csv("balance.csv", common::BALANCE_CSV),
            SourceDocument::new("memo.docx", common::docx(&["Acme BV owes 1560.50"])),
            SourceDocument::new("photo.png", common::png()),
        ]
    };
    let mut permuted = batch();
    permuted.reverse();
    permuted.swap(0, 2);

    let m1 = Arc::new(classifying_model());
    let m2 = Arc::new(classifying_model());
    let o1 = orchestrator(default_config(), &m1, FakeNative::new(), None);
    let o2 = orchestrator(default_config(), &m2, FakeNative::new(), None);
    let r1 = o1.run_consolidated(batch()).await.unwrap().analysis;
    let r2 = o2.run_consolidated(permuted).await.unwrap().analysis;

    let ids = |r: &edgequake_doclens::ConsolidatedResult| {
        (
            r.included_documents.iter().map(|d| d.id.clone()).collect::<BTreeSet<_>>(),
            r.excluded_documents.iter().map(|d| d.id.clone()).collect::<BTreeSet<_>>(),
        )
    };
    assert_eq!(ids(&r1), ids(&r2));
    assert_eq!(r1.included_documents, r2.included_documents);
    assert_eq!(r1.included_documents.len(), 3);
    assert_eq!(r1.excluded_documents.len(), 1);
    assert!(r1.cross_document);

    let prompt = |m: &ScriptedModel| {
        m.requests()
            .into_iter()
            .find(|r| r.shape == ResponseShape::Consolidated)
            .map(|r| r.prompt)
            .unwrap()
    };
    assert_eq!(prompt(&*m1), prompt(&*m2));
}

#[tokio::test]
async fn consolidation_with_no_classified_documents_is_rejected() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let err = orch
        .run_consolidated(vec![
            SourceDocument::new("a.png", common::png()),
            csv("ragged.csv", "a,b\n1\n"),
        ])
        .await
        .unwrap_err();
    match err {
        DoclensError::NoViableDocuments { total, excluded } => {
            assert_eq!(total, 2);
            assert!(excluded.contains("a.png"));
            assert!(excluded.contains("ragged.csv"));
        }
        other => panic!("expected NoViableDocuments, got {other:?}"),
    }
    assert_eq!(model.calls(ResponseShape::Consolidated), 0);
}

#[tokio::test]
async fn consolidation_when_every_classification_fails_is_rejected() {
    let model = Arc::new(ScriptedModel::new().fail_shape(ResponseShape::Classification));
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let err = orch
        .run_consolidated(vec![
            csv("a.csv", common::INVOICE_CSV),
            csv("b.csv", common::BALANCE_CSV),
        ])
        .await
        .unwrap_err();
    match err {
        DoclensError::NoViableDocuments { total, excluded } => {
            assert_eq!(total, 2);
            assert!(excluded.contains("a.csv"), "{excluded}");
            assert!(excluded.contains("b.csv"), "{excluded}");
            assert!(excluded.contains("Classification failed"), "{excluded}");
        }
        other => panic!("expected NoViableDocuments, got {other:?}"),
    }
    assert_eq!(model.calls(ResponseShape::Classification), 2);
    assert_eq!(model.calls(ResponseShape::Consolidated), 0);
}

#[tokio::test]
async fn classification_failure_is_listed_as_an_exclusion() {
    let model = Arc::new(classifying_model().respond_when(
        ResponseShape::Classification,
        "receipts.csv",
        r#"{"document_type": "Receipt"}"#,
    ));
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let out = orch
        .run_consolidated(vec![
            csv("receipts.csv", "store,total\nCorner shop,4.20\n"),
            csv("balance.csv", common::BALANCE_CSV),
        ])
        .await
        .unwrap();

    let a = &out.analysis;
    assert_eq!(a.included_documents.len(), 1);
    assert_eq!(a.included_documents[0].filename, "balance.csv");
    assert_eq!(a.excluded_documents.len(), 1);
    let excluded = &a.excluded_documents[0];
    assert_eq!(excluded.filename, "receipts.csv");
    assert_eq!(excluded.state, DocumentState::ClassificationFailed);
    assert!(
        matches!(
            excluded.error,
            Some(DocumentError::ClassificationFailure { .. })
        ),
        "{:?}",
        excluded.error
    );
    assert!(a.summary.contains("1 of 2 documents were excluded"));
}

#[tokio::test]
async fn csv_plus_unreadable_scan_is_a_noted_single_document_synthesis() {
    let model = Arc::new(classifying_model());
    let orch = orchestrator(
        default_config(),
        &model,
        FakeNative::new().with_text(DocumentKind::Pdf, "", 1),
        None,
    );
    let out = orch
        .run_consolidated(vec![
            csv("invoices.csv", common::INVOICE_CSV),
            SourceDocument::new("scan.pdf", b"%PDF-1.4".to_vec()),
        ])
        .await
        .unwrap();

    let a = &out.analysis;
    assert!(!a.cross_document);
    assert_eq!(a.included_documents.len(), 1);
    assert_eq!(a.excluded_documents.len(), 1);
    assert_eq!(
        a.excluded_documents[0].error,
        Some(DocumentError::OcrUnavailable)
    );
    assert!(a.summary.contains("no cross-document comparison"));
    assert!(a.summary.contains("1 of 2 documents were excluded"));
    assert!(a.summary.contains("scan.pdf"));
    assert_eq!((out.succeeded, out.failed), (1, 1));
}

#[tokio::test]
async fn run_dispatches_on_mode() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let out = orch
        .run(
            AnalysisMode::Consolidated,
            vec![csv("invoices.csv", common::INVOICE_CSV)],
        )
        .await
        .unwrap();
    assert!(matches!(out, BatchOutput::Consolidated(_)));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_every_document_once() {
    let model = Arc::new(ScriptedModel::new());
    let orch = orchestrator(default_config(), &model, FakeNative::new(), None);
    let mut stream = process_stream(
        &orch,
        vec![
            csv("a.csv", common::INVOICE_CSV),
            csv("b.csv", common::BALANCE_CSV),
            SourceDocument::new("c.png", common::png()),
        ],
    )
    .unwrap();

    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        let doc = item.unwrap();
        assert!(doc.is_terminal());
        seen.push(doc.filename().to_string());
    }
    seen.sort();
    assert_eq!(seen, vec!["a.csv", "b.csv", "c.png"]);
}

// ── Real pdfium ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn real_text_pdf_is_read_natively() {
    if render::bind_pdfium().is_err() {
        println!("SKIP: pdfium not available");
        return;
    }
    let model = Arc::new(classifying_model());
    let ocr = Arc::new(FakeOcr::returning("unused"));
    let orch = BatchOrchestrator::new(
        default_config(),
        Providers::new(Arc::clone(&model) as _).with_ocr(Arc::clone(&ocr) as _),
    );
    let pdf = common::text_pdf(&[RICH_PDF_TEXT]);
    let job = orch
        .process_batch(vec![SourceDocument::new("pnl.pdf", pdf)])
        .await
        .unwrap();
    let doc = &job.documents[0];
    assert_eq!(doc.extraction_method(), Some(ExtractionMethod::Native));
    assert!(doc.text().contains("Gross profit"));
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test]
async fn real_scanned_pdf_goes_to_ocr() {
    if render::bind_pdfium().is_err() {
        println!("SKIP: pdfium not available");
        return;
    }
    let model = Arc::new(ScriptedModel::new());
    let ocr = Arc::new(FakeOcr::returning("CONTRACT between Acme BV and Beta NV"));
    let orch = BatchOrchestrator::new(
        default_config(),
        Providers::new(Arc::clone(&model) as _).with_ocr(Arc::clone(&ocr) as _),
    );
    let job = orch
        .process_batch(vec![SourceDocument::new("scan.pdf", common::scanned_pdf())])
        .await
        .unwrap();
    assert_eq!(
        job.documents[0].extraction_method(),
        Some(ExtractionMethod::Ocr)
    );
    assert_eq!(ocr.calls(), 1);
}
