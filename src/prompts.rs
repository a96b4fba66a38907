//! Prompts for OCR transcription, classification, per-document analysis and
//! consolidated analysis.
//!
//! Centralising every prompt here keeps prompt edits away from retry and
//! parsing logic, and lets unit tests inspect the exact text a model sees.

use std::fmt::Write as _;

// ── OCR ──────────────────────────────────────────────────────────────────

/// System prompt for transcribing one page image.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the image exactly as written.

Rules:
- Preserve the reading order a human would follow
- Keep numbers, amounts, dates, identifiers and names character-exact
- Render tables as rows with cells separated by " | "
- Do NOT translate, summarise, correct or explain anything
- Do NOT describe images, logos or layout
- Do NOT wrap the output in code fences
- If the image contains no readable text, output nothing"#;

/// Extra system message narrowing OCR to a region of interest.
pub fn ocr_region_hint(hint: &str) -> String {
    format!("Focus on this region of the page, but still transcribe it completely: {hint}")
}

// ── Classification ───────────────────────────────────────────────────────

pub const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"You classify business documents. Respond ONLY with a JSON object of the form:
{"document_type": "<label>", "rationale": "<one sentence explaining the choice>"}

The label MUST be exactly one of:
- Invoice
- BalanceSheet
- ProfitAndLossStatement
- Contract
- GeneralDocument

Use GeneralDocument when none of the others clearly applies."#;

/// User message for classification. `excerpt` is already truncated.
pub fn classification_prompt(filename: &str, excerpt: &str) -> String {
    format!("Filename: {filename}\n\nDocument text:\n\"\"\"\n{excerpt}\n\"\"\"")
}

// ── Per-document analysis ────────────────────────────────────────────────

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert document analyst. Produce SPECIFIC, DETAILED output: exact amounts, dates, identifiers, company and person names taken from the document. Avoid vague advice such as "review the terms" or "pay promptly"; say which invoice, which amount, which deadline.

Respond ONLY with a JSON object in this exact structure:
{
  "language": "<detected language, e.g. English, Dutch>",
  "summary": "<comprehensive summary with the concrete details>",
  "recommendations": ["<specific, immediately actionable step>", "..."],
  "key_details": {"<Field name>": "<exact value>"}
}

Keep key_details minimal: only the facts that support the summary and recommendations."#;

pub fn analysis_prompt(filename: &str, document_type: &str, text: &str) -> String {
    format!(
        "Filename: {filename}\nDocument type: {document_type}\n\nDocument text:\n\"\"\"\n{text}\n\"\"\""
    )
}

// ── Consolidated analysis ────────────────────────────────────────────────

pub const CONSOLIDATED_SYSTEM_PROMPT: &str = r#"You are an expert analyst reviewing a SET of related business documents together. Each document is introduced by a header line carrying its identifier. The order in which documents appear carries no meaning.

Your job is to synthesise, not to summarise each document in turn:
- Cross-reference the documents: match invoices to contracts, amounts to statements, parties across files
- Point out inconsistencies, gaps and dependencies between documents
- Refer to documents by their identifier in square brackets, e.g. [doc-1a2b3c4d5e6f]
- Be specific: exact amounts, dates, identifiers and names

Respond ONLY with a JSON object in this exact structure:
{
  "summary": "<comprehensive synthesised summary across all documents>",
  "key_findings": ["<finding, citing document identifiers>", "..."],
  "recommendations": ["<specific recommendation>", "..."],
  "priority_actions": ["<most urgent action first>", "..."]
}

The recommendations list is ordered: most important first."#;

/// One included document as it appears in the consolidated prompt.
#[derive(Debug, Clone)]
pub struct PromptDocument<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub document_type: &'a str,
    pub method: &'a str,
    pub text: &'a str,
    pub truncated: bool,
}

/// One excluded document, listed so the model knows the picture is partial.
#[derive(Debug, Clone)]
pub struct PromptExclusion<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub reason: String,
}

/// Header line introducing a document block.
pub fn document_header(doc: &PromptDocument<'_>) -> String {
    format!(
        "### Document [{}] {} ({}, extracted via {})",
        doc.id, doc.filename, doc.document_type, doc.method
    )
}

/// Build the consolidated user message.
///
/// Callers pass documents in a canonical order; this function does not sort.
pub fn consolidated_prompt(docs: &[PromptDocument<'_>], excluded: &[PromptExclusion<'_>]) -> String {
    let mut out = String::new();

    if docs.len() == 1 {
        out.push_str(
            "Only ONE document is available. There is nothing to cross-reference; \
             analyse it on its own and do not invent comparisons.\n\n",
        );
    } else {
        let _ = writeln!(
            out,
            "Analyse the following {} documents together.\n",
            docs.len()
        );
    }

    for doc in docs {
        out.push_str(&document_header(doc));
        out.push('\n');
        out.push_str(doc.text.trim_end());
        if doc.truncated {
            out.push_str("\n[… text truncated …]");
        }
        out.push_str("\n\n");
    }

    if !excluded.is_empty() {
        out.push_str("The following documents were submitted but could not be processed; \
                      do not draw conclusions about their content:\n");
        for ex in excluded {
            let _ = writeln!(out, "- [{}] {}: {}", ex.id, ex.filename, ex.reason);
        }
    }

    out
}
