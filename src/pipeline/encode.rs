//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless, so text edges survive; JPEG artefacts on small print
//! hurt transcription more than the extra bytes cost. `detail: "high"` asks
//! GPT-4-class models to tile the image instead of reading one 512 px
//! overview.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page image as a base64 PNG ready for the vision API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Decode an uploaded image and shrink it so its longest edge is at most
/// `max_pixels`. Smaller images are returned untouched.
pub fn decode_upload(bytes: &[u8], max_pixels: u32) -> Result<DynamicImage, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    if img.width().max(img.height()) <= max_pixels {
        return Ok(img);
    }
    debug!(
        "Downscaling {}x{} upload to fit {} px",
        img.width(),
        img.height(),
        max_pixels
    );
    Ok(img.resize(max_pixels, max_pixels, FilterType::Triangle))
}
