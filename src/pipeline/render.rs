//! pdfium access: text-layer extraction and page rasterisation.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. The async entry point here moves the work onto the blocking
//! pool; the `*_blocking` functions are called directly from code that is
//! already on it (the native extractor).
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_pixels` caps the longest edge regardless
//! of physical size, keeping memory bounded and matching the image sizes
//! vision models read best (around 1,024–2,048 px).

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum PdfError {
    /// No pdfium shared library could be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    Binding(String),

    /// The container could not be opened (corrupt, truncated, encrypted).
    #[error("PDF could not be opened: {0}")]
    Load(String),

    /// A single page failed to load or render.
    #[error("Page {page}: {detail}")]
    Page { page: usize, detail: String },
}

/// Bind pdfium, honouring `PDFIUM_LIB_PATH` (a file or a directory), then
/// the working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, PdfError> {
    let mut attempts: Vec<String> = Vec::new();

    if let Ok(configured) = std::env::var("PDFIUM_LIB_PATH") {
        let p = PathBuf::from(&configured);
        let lib = if p.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&p)
        } else {
            p
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(b) => return Ok(Pdfium::new(b)),
            Err(e) => attempts.push(format!("{}: {:?}", lib.display(), e)),
        }
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(b) => return Ok(Pdfium::new(b)),
        Err(e) => attempts.push(format!("./: {:?}", e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(b) => Ok(Pdfium::new(b)),
        Err(e) => {
            attempts.push(format!("system: {:?}", e));
            Err(PdfError::Binding(attempts.join("; ")))
        }
    }
}

/// Text layer of every page, in page order.
pub fn extract_text_blocking(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PdfError::Load(format!("{:?}", e)))?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| PdfError::Page {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;
        pages.push(text.all());
    }
    debug!("pdfium text layer: {} pages", pages.len());
    Ok(pages)
}

/// Rasterise every page, longest edge capped at `max_pixels`.
pub fn render_pages_blocking(bytes: &[u8], max_pixels: u32) -> Result<Vec<DynamicImage>, PdfError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PdfError::Load(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PdfError::Page {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}

/// Async wrapper over [`render_pages_blocking`].
pub async fn render_pages(bytes: Arc<[u8]>, max_pixels: u32) -> Result<Vec<DynamicImage>, PdfError> {
    tokio::task::spawn_blocking(move || render_pages_blocking(&bytes, max_pixels))
        .await
        .map_err(|e| PdfError::Load(format!("render task panicked: {e}")))?
}
