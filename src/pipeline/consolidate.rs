//! Consolidated analysis: one synthesis over every classified document.
//!
//! Runs only after the whole batch is terminal. Documents are ordered by id
//! before anything is built, so the prompt (and with a deterministic model,
//! the result) does not depend on upload or completion order. Excluded
//! documents are listed in the prompt and in the result notes; their
//! content is never sent.

use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::DoclensError;
use crate::output::{ConsolidatedResult, ExcludedDocument, IncludedDocument};
use crate::pipeline::classify::leading_window;
use crate::pipeline::llm::{parse_json_response, LanguageModel, ModelRequest, ResponseShape};
use crate::prompts::{
    consolidated_prompt, PromptDocument, PromptExclusion, CONSOLIDATED_SYSTEM_PROMPT,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const CONSOLIDATION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Deserialize)]
struct RawConsolidated {
    #[serde(alias = "comprehensive_summary")]
    summary: String,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default, alias = "detailed_recommendations")]
    recommendations: Vec<String>,
    #[serde(default)]
    priority_actions: Vec<String>,
}

/// Why a document is not part of the synthesis.
fn exclusion_reason(doc: &Document) -> String {
    match doc.error() {
        Some(e) => e.to_string(),
        None => format!("document ended in state {:?}", doc.state()),
    }
}

pub struct ConsolidatedAnalyzer {
    model: Arc<dyn LanguageModel>,
    char_budget: usize,
    max_tokens: usize,
}

impl ConsolidatedAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, char_budget: usize, max_tokens: usize) -> Self {
        Self {
            model,
            char_budget,
            max_tokens,
        }
    }

    pub fn from_config(config: &PipelineConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self::new(model, config.consolidated_char_budget, config.max_tokens)
    }

    /// Synthesise across `documents`, which must all be terminal.
    ///
    /// Fails with [`DoclensError::NoViableDocuments`] when nothing was
    /// classified, and [`DoclensError::ConsolidationFailed`] when the model
    /// call fails or its answer cannot be used.
    pub async fn analyze(&self, documents: &[Document]) -> Result<ConsolidatedResult, DoclensError> {
        let mut included: Vec<&Document> = documents.iter().filter(|d| d.succeeded()).collect();
        let mut excluded: Vec<&Document> = documents.iter().filter(|d| !d.succeeded()).collect();
        included.sort_by(|a, b| a.id().cmp(b.id()));
        excluded.sort_by(|a, b| a.id().cmp(b.id()));

        let excluded_docs: Vec<ExcludedDocument> = excluded
            .iter()
            .map(|d| ExcludedDocument {
                id: d.id().clone(),
                filename: d.filename().to_string(),
                state: d.state(),
                error: d.error().cloned(),
                reason: exclusion_reason(d),
            })
            .collect();

        if included.is_empty() {
            let summary = excluded_docs
                .iter()
                .map(|e| format!("{} ({}): {}", e.filename, e.id, e.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DoclensError::NoViableDocuments {
                total: documents.len(),
                excluded: summary,
            });
        }

        // Even split; a document shorter than its share leaves the rest unused.
        let per_doc = (self.char_budget / included.len()).max(1);
        let mut included_docs = Vec::with_capacity(included.len());
        let mut prompt_docs = Vec::with_capacity(included.len());
        for doc in &included {
            // `succeeded()` guarantees both are present.
            let (Some(document_type), Some(method)) = (doc.document_type(), doc.extraction_method())
            else {
                continue;
            };
            let (text, truncated) = leading_window(doc.text(), per_doc);
            prompt_docs.push(PromptDocument {
                id: doc.id().as_str(),
                filename: doc.filename(),
                document_type: document_type.as_str(),
                method: method.as_str(),
                text,
                truncated,
            });
            included_docs.push(IncludedDocument {
                id: doc.id().clone(),
                filename: doc.filename().to_string(),
                document_type,
                extraction_method: method,
            });
        }
        let prompt_exclusions: Vec<PromptExclusion<'_>> = excluded_docs
            .iter()
            .map(|e| PromptExclusion {
                id: e.id.as_str(),
                filename: &e.filename,
                reason: e.reason.clone(),
            })
            .collect();

        info!(
            "Consolidating {} document(s), {} excluded, {} chars per document",
            included_docs.len(),
            excluded_docs.len(),
            per_doc
        );

        let request = ModelRequest {
            shape: ResponseShape::Consolidated,
            system: CONSOLIDATED_SYSTEM_PROMPT.to_string(),
            prompt: consolidated_prompt(&prompt_docs, &prompt_exclusions),
            temperature: CONSOLIDATION_TEMPERATURE,
            max_tokens: self.max_tokens,
        };
        let raw = self
            .model
            .complete(&request)
            .await
            .map_err(|e| DoclensError::ConsolidationFailed {
                detail: e.to_string(),
            })?;
        let parsed: RawConsolidated =
            parse_json_response(&raw).map_err(|e| DoclensError::ConsolidationFailed {
                detail: e.to_string(),
            })?;
        if parsed.summary.trim().is_empty() {
            return Err(DoclensError::ConsolidationFailed {
                detail: "model returned an empty summary".into(),
            });
        }

        let cross_document = included_docs.len() > 1;
        let mut notes = Vec::new();
        if !cross_document {
            notes.push(
                "Only one document could be analysed; no cross-document comparison was possible."
                    .to_string(),
            );
        }
        if !excluded_docs.is_empty() {
            let list = excluded_docs
                .iter()
                .map(|e| format!("{} [{}]: {}", e.filename, e.id, e.reason))
                .collect::<Vec<_>>()
                .join("; ");
            notes.push(format!(
                "{} of {} documents were excluded from this analysis: {}",
                excluded_docs.len(),
                documents.len(),
                list
            ));
            warn!(
                "{} document(s) excluded from consolidated analysis",
                excluded_docs.len()
            );
        }

        let mut summary = parsed.summary.trim().to_string();
        for note in &notes {
            summary.push_str("\n\nNote: ");
            summary.push_str(note);
        }

        Ok(ConsolidatedResult {
            summary,
            key_findings: parsed.key_findings,
            recommendations: parsed.recommendations,
            priority_actions: parsed.priority_actions,
            included_documents: included_docs,
            excluded_documents: excluded_docs,
            cross_document,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        Classification, DocumentId, DocumentType, ExtractionMethod, ExtractionOutcome,
    };
    use crate::error::DocumentError;
    use crate::testing::ScriptedModel;

    fn classified(id: &str, text: &str, label: DocumentType) -> Document {
        let mut d = Document::pending(DocumentId::new(id), format!("{id}.pdf"));
        d.begin_extraction(None).unwrap();
        d.record_extraction(ExtractionOutcome::Extracted {
            text: text.into(),
            method: ExtractionMethod::Native,
        })
        .unwrap();
        d.begin_classification().unwrap();
        d.record_classification(Ok(Classification {
            label,
            rationale: String::new(),
        }))
        .unwrap();
        d
    }

    fn rejected(id: &str) -> Document {
        let mut d = Document::pending(DocumentId::new(id), format!("{id}.pdf"));
        d.begin_extraction(None).unwrap();
        d.record_extraction(ExtractionOutcome::Failed {
            reason: DocumentError::OcrUnavailable,
        })
        .unwrap();
        d
    }

    fn analyzer(model: Arc<ScriptedModel>, budget: usize) -> ConsolidatedAnalyzer {
        ConsolidatedAnalyzer::new(model, budget, 3000)
    }

    #[tokio::test]
    async fn prompt_is_independent_of_input_order() {
        let docs = vec![
            classified("doc-b", "beta text", DocumentType::Contract),
            classified("doc-a", "alpha text", DocumentType::Invoice),
            rejected("doc-c"),
        ];
        let mut reversed = docs.clone();
        reversed.reverse();

        let m1 = Arc::new(ScriptedModel::new());
        let m2 = Arc::new(ScriptedModel::new());
        let r1 = analyzer(m1.clone(), 12000).analyze(&docs).await.unwrap();
        let r2 = analyzer(m2.clone(), 12000).analyze(&reversed).await.unwrap();

        assert_eq!(m1.requests()[0].prompt, m2.requests()[0].prompt);
        assert_eq!(r1.included_documents, r2.included_documents);
        assert_eq!(r1.excluded_documents, r2.excluded_documents);
        assert_eq!(r1.included_documents[0].id.as_str(), "doc-a");

        let prompt = &m1.requests()[0].prompt;
        let a = prompt.find("[doc-a]").unwrap();
        let b = prompt.find("[doc-b]").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn nothing_classified_is_no_viable_documents() {
        let model = Arc::new(ScriptedModel::new());
        let err = analyzer(model.clone(), 100)
            .analyze(&[rejected("doc-x"), rejected("doc-y")])
            .await
            .unwrap_err();
        match err {
            DoclensError::NoViableDocuments { total, excluded } => {
                assert_eq!(total, 2);
                assert!(excluded.contains("doc-x"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(model.calls(ResponseShape::Consolidated), 0);
    }

    #[tokio::test]
    async fn single_document_is_flagged() {
        let model = Arc::new(ScriptedModel::new());
        let r = analyzer(model, 100)
            .analyze(&[classified("doc-a", "alpha", DocumentType::Invoice)])
            .await
            .unwrap();
        assert!(!r.cross_document);
        assert!(r.summary.contains("no cross-document comparison"));
    }

    #[tokio::test]
    async fn exclusions_are_noted_and_never_sent() {
        let model = Arc::new(ScriptedModel::new());
        let r = analyzer(model.clone(), 100)
            .analyze(&[
                classified("doc-a", "alpha", DocumentType::Invoice),
                classified("doc-b", "beta", DocumentType::Contract),
                rejected("doc-c"),
            ])
            .await
            .unwrap();
        assert!(r.cross_document);
        assert_eq!(r.excluded_documents.len(), 1);
        assert!(r.notes[0].starts_with("1 of 3 documents were excluded"));
        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains("- [doc-c] doc-c.pdf"));
    }

    #[tokio::test]
    async fn budget_is_split_across_documents() {
        let model = Arc::new(ScriptedModel::new());
        analyzer(model.clone(), 20)
            .analyze(&[
                classified("doc-a", &"a".repeat(50), DocumentType::Invoice),
                classified("doc-b", &"b".repeat(50), DocumentType::Invoice),
            ])
            .await
            .unwrap();
        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains(&"a".repeat(10)));
        assert!(!prompt.contains(&"a".repeat(11)));
        assert!(prompt.contains("truncated"));
    }

    #[tokio::test]
    async fn malformed_answer_is_consolidation_failure() {
        let model = Arc::new(ScriptedModel::new().respond(ResponseShape::Consolidated, "sorry"));
        let err = analyzer(model, 100)
            .analyze(&[classified("doc-a", "alpha", DocumentType::Invoice)])
            .await
            .unwrap_err();
        assert!(matches!(err, DoclensError::ConsolidationFailed { .. }));
    }
}
