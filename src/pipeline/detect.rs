//! Format detection: filename + leading bytes → [`DocumentKind`].
//!
//! The extension is authoritative when it names a supported kind. Content
//! sniffing is the fallback for uploads whose extension is missing or
//! generic (`.bin`, `.dat`, `.tmp`), which is common for files proxied
//! through browsers and object stores. A disagreement between the two is
//! logged but never overrides the extension.

use crate::document::DocumentKind;
use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "csv", "xlsx", "png", "jpg", "jpeg"];

/// Extensions that carry no format information.
const AMBIGUOUS_EXTENSIONS: &[&str] = &["bin", "dat", "tmp"];

const MIME_PDF: &str = "application/pdf";
const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MIME_CSV: &str = "text/csv";
const MIME_PNG: &str = "image/png";
const MIME_JPEG: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Extension,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFormat {
    pub kind: DocumentKind,
    pub mime_type: String,
    pub source: DetectionSource,
}

/// Lower-cased extension of `filename`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether the upload boundary should accept this filename.
///
/// Returns the offending extension when it is neither supported nor generic.
pub fn check_extension(filename: &str) -> Result<(), String> {
    match extension_of(filename) {
        None => Ok(()),
        Some(ext)
            if SUPPORTED_EXTENSIONS.contains(&ext.as_str())
                || AMBIGUOUS_EXTENSIONS.contains(&ext.as_str()) =>
        {
            Ok(())
        }
        Some(ext) => Err(ext),
    }
}

fn from_extension(ext: &str) -> Option<(DocumentKind, &'static str)> {
    match ext {
        "pdf" => Some((DocumentKind::Pdf, MIME_PDF)),
        "docx" => Some((DocumentKind::Docx, MIME_DOCX)),
        "csv" => Some((DocumentKind::Csv, MIME_CSV)),
        "xlsx" => Some((DocumentKind::Xlsx, MIME_XLSX)),
        "png" => Some((DocumentKind::Image, MIME_PNG)),
        "jpg" | "jpeg" => Some((DocumentKind::Image, MIME_JPEG)),
        _ => None,
    }
}

/// Identify a payload from its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<(DocumentKind, &'static str)> {
    if bytes.starts_with(b"%PDF") {
        return Some((DocumentKind::Pdf, MIME_PDF));
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some((DocumentKind::Image, MIME_PNG));
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some((DocumentKind::Image, MIME_JPEG));
    }
    if bytes.starts_with(b"PK\x03\x04") {
        // OOXML containers name their parts in clear text in the zip headers.
        if contains(bytes, b"word/") {
            return Some((DocumentKind::Docx, MIME_DOCX));
        }
        if contains(bytes, b"xl/") {
            return Some((DocumentKind::Xlsx, MIME_XLSX));
        }
        return None;
    }
    if looks_like_csv(bytes) {
        return Some((DocumentKind::Csv, MIME_CSV));
    }
    None
}

/// Detect the kind of one document.
pub fn detect(filename: &str, bytes: &[u8]) -> Result<DetectedFormat, DocumentError> {
    let ext = extension_of(filename);

    if let Some((kind, mime)) = ext.as_deref().and_then(from_extension) {
        if let Some((sniffed, _)) = sniff(bytes) {
            if sniffed != kind {
                debug!(
                    "{}: extension says {}, content looks like {}; keeping extension",
                    filename, kind, sniffed
                );
            }
        }
        return Ok(DetectedFormat {
            kind,
            mime_type: mime.to_string(),
            source: DetectionSource::Extension,
        });
    }

    if let Some(ref e) = ext {
        if !AMBIGUOUS_EXTENSIONS.contains(&e.as_str()) {
            return Err(DocumentError::UnsupportedFormat {
                detail: format!("extension '.{e}' is not supported"),
            });
        }
    }

    match sniff(bytes) {
        Some((kind, mime)) => {
            debug!("{}: detected {} from content signature", filename, kind);
            Ok(DetectedFormat {
                kind,
                mime_type: mime.to_string(),
                source: DetectionSource::Signature,
            })
        }
        None => Err(DocumentError::UnsupportedFormat {
            detail: "content does not match any supported format".into(),
        }),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// At least two non-empty lines of UTF-8 text sharing the same, non-zero,
/// number of commas.
fn looks_like_csv(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(4096)];
    if head.contains(&0) {
        return false;
    }
    // A multi-byte character may straddle the 4 KiB cut.
    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        Err(e) => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(t) if e.error_len().is_none() => t,
            _ => return false,
        },
    };
    let counts: Vec<usize> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(5)
        .map(|l| l.matches(',').count())
        .collect();
    counts.len() >= 2 && counts[0] > 0 && counts.iter().all(|&c| c == counts[0])
}
