//! Post-processing: deterministic cleanup of VLM page transcripts.
//!
//! The OCR engine asks a vision model for a plain transcription. Models still
//! wrap the answer in code fences, invent image links for figures, emit CRLF,
//! sprinkle zero-width characters, or add "Page 3 of 7" footers of their own.
//! None of that is document text, and all of it would inflate the character
//! count the sufficiency check and the classifier look at.
//!
//! Rules run in a fixed order: fences first so later rules see the real
//! content, line-ending normalisation before any line-based rule, final
//! newline last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to one page transcript.
///
/// 1. Strip outer code fences (```` ```markdown ````, ```` ```text ````, bare)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Drop model-invented "Page N of M" marker lines
/// 5. Replace invented image links with their alt text
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Collapse 3+ consecutive blank lines down to 2
/// 8. Ensure the text ends with exactly one newline
pub fn clean_transcript(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = drop_page_markers(&s);
    let s = replace_image_links(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text|plaintext)?\r?\n(.*)\r?\n```\s*$").unwrap()
});

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop page markers ────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*_=]+\s*)?page\s+\d+(?:\s*(?:of|/)\s*\d+)?(?:\s*[-*_=]+)?\s*$").unwrap()
});

fn drop_page_markers(input: &str) -> String {
    input
        .lines()
        .filter(|line| !RE_PAGE_MARKER.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Replace image links ──────────────────────────────────────────────
//
// A transcription has no use for `![chart](chart.png)`; the model invented
// the URL. The alt text sometimes carries a caption worth keeping.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn replace_image_links(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| caps[1].trim().to_string())
        .to_string()
}

// ── Rule 6: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 7: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 8: Ensure single final newline ──────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
