//! Native extraction: text straight from a file's digital structure.
//!
//! No image recognition happens here. PDFs yield their embedded text layer
//! (which may be empty for scans; the strategy selector decides what to do
//! about that), DOCX yields paragraph and table text, CSV and XLSX yield
//! their cells row by row.
//!
//! Everything in this module is synchronous. The selector runs it on the
//! blocking pool.

use crate::document::DocumentKind;
use crate::error::DocumentError;
use crate::pipeline::render;
use calamine::Reader;
use std::io::Cursor;
use tracing::debug;

/// Text recovered without OCR, with the page count used by the
/// sufficiency check. Sheets count as pages; DOCX and CSV are one page.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeText {
    pub text: String,
    pub page_count: usize,
}

/// Synchronous text-from-bytes capability.
pub trait NativeExtractor: Send + Sync {
    fn extract(&self, kind: DocumentKind, bytes: &[u8]) -> Result<NativeText, DocumentError>;
}

/// The production extractor: pdfium, docx-rs, csv and calamine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardExtractor;

impl NativeExtractor for StandardExtractor {
    fn extract(&self, kind: DocumentKind, bytes: &[u8]) -> Result<NativeText, DocumentError> {
        let result = match kind {
            DocumentKind::Pdf => extract_pdf(bytes),
            DocumentKind::Docx => extract_docx(bytes),
            DocumentKind::Csv => extract_csv(bytes),
            DocumentKind::Xlsx => extract_xlsx(bytes),
            DocumentKind::Image => Err(failure("images have no native text layer")),
        };
        if let Ok(ref t) = result {
            debug!(
                "native {}: {} chars over {} page(s)",
                kind,
                t.text.len(),
                t.page_count
            );
        }
        result
    }
}

fn failure(cause: impl Into<String>) -> DocumentError {
    DocumentError::ExtractionFailure {
        cause: cause.into(),
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

fn extract_pdf(bytes: &[u8]) -> Result<NativeText, DocumentError> {
    let pages = render::extract_text_blocking(bytes).map_err(|e| failure(e.to_string()))?;
    Ok(NativeText {
        page_count: pages.len(),
        text: pages.join("\n\n"),
    })
}

// ── DOCX ─────────────────────────────────────────────────────────────────

fn extract_docx(bytes: &[u8]) -> Result<NativeText, DocumentError> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| failure(format!("invalid DOCX: {e}")))?;

    let mut out = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                push_paragraph(para, &mut out);
                out.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    let mut cells: Vec<String> = Vec::new();
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        let mut cell_text = String::new();
                        for content in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(para) = content {
                                push_paragraph(para, &mut cell_text);
                            }
                        }
                        cells.push(cell_text.trim().to_string());
                    }
                    out.push_str(&cells.join(" | "));
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    Ok(NativeText {
        text: out,
        page_count: 1,
    })
}

fn push_paragraph(para: &docx_rs::Paragraph, out: &mut String) {
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(run, out),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = inner {
                        push_run(run, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, out: &mut String) {
    for rc in &run.children {
        if let docx_rs::RunChild::Text(t) = rc {
            out.push_str(&t.text);
        }
    }
}

// ── CSV ──────────────────────────────────────────────────────────────────

/// Strict: a ragged row or invalid UTF-8 fails the whole file.
fn extract_csv(bytes: &[u8]) -> Result<NativeText, DocumentError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut out = String::new();

    let headers = reader
        .headers()
        .map_err(|e| failure(format!("invalid CSV header: {e}")))?;
    out.push_str(&headers.iter().collect::<Vec<_>>().join(" | "));
    out.push('\n');

    for record in reader.records() {
        let record = record.map_err(|e| failure(format!("invalid CSV: {e}")))?;
        out.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
        out.push('\n');
    }

    Ok(NativeText {
        text: out,
        page_count: 1,
    })
}

// ── XLSX ─────────────────────────────────────────────────────────────────

fn extract_xlsx(bytes: &[u8]) -> Result<NativeText, DocumentError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| failure(format!("invalid spreadsheet: {e}")))?;

    let mut out = String::new();
    let sheet_names = workbook.sheet_names().to_vec();
    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| failure(format!("sheet '{name}': {e}")))?;

        out.push_str(&format!("Sheet: {name}\n"));
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        out.push('\n');
    }

    Ok(NativeText {
        text: out,
        page_count: sheet_names.len().max(1),
    })
}

fn cell_to_string(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::Empty => String::new(),
        calamine::Data::String(s) => s.clone(),
        calamine::Data::Float(f) => f.to_string(),
        calamine::Data::Int(i) => i.to_string(),
        calamine::Data::Bool(b) => b.to_string(),
        calamine::Data::DateTime(dt) => excel_datetime_to_string(dt),
        calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => s.clone(),
        calamine::Data::Error(e) => e.to_string(),
    }
}

/// Serial dates become `YYYY-MM-DD`, with the time only when it is not
/// midnight. Durations and out-of-range serials keep the raw number.
fn excel_datetime_to_string(dt: &calamine::ExcelDateTime) -> String {
    if dt.is_datetime() {
        if let Some(naive) = dt.as_datetime() {
            let s = naive.to_string();
            return match s.strip_suffix(" 00:00:00") {
                Some(date) => date.to_string(),
                None => s,
            };
        }
    }
    dt.as_f64().to_string()
}
