//! Pipeline stages for document extraction, classification and analysis.
//!
//! Each submodule implements one step. Stages talk to the outside world
//! only through the capability traits ([`native::NativeExtractor`],
//! [`ocr::OcrEngine`], [`llm::LanguageModel`]), so each is testable alone.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ detect ──▶ strategy ──▶ classify ──▶ analyze / consolidate
//! (path/URL) (kind)    (native|OCR)  (label)     (LLM)
//! ```
//!
//! 1. [`input`]   : read a path or download a URL into memory
//! 2. [`detect`]  : extension first, content signature as fallback
//! 3. [`strategy`]: fixed per kind: native, OCR, or native with OCR fallback
//!    - [`native`] reads text layers and cells (pdfium, docx-rs, csv, calamine)
//!    - [`ocr`] rasterises via [`render`]/[`encode`] and transcribes with a
//!      vision model; [`postprocess`] cleans the transcript
//! 4. [`classify`]: one label from a fixed vocabulary
//! 5. [`analyze`] per document, or [`consolidate`] across the batch

pub mod analyze;
pub mod classify;
pub mod consolidate;
pub mod detect;
pub mod encode;
pub mod input;
pub mod llm;
pub mod native;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod strategy;
