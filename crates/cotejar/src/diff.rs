//! Diff artifact rendering.
//!
//! Only invoked on failing comparisons; a passing pair never pays for
//! rendering or encoding.

use crate::result::{CotejarError, CotejarResult};
use crate::similarity::channel_delta;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};

/// Highlight color for differing pixels
const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Rendered visual evidence for a failed comparison
#[derive(Debug, Clone)]
pub struct DiffArtifact {
    /// PNG-encoded diff image
    pub bytes: Vec<u8>,
    /// Diff image width (matches the normalized pair)
    pub width: u32,
    /// Diff image height (matches the normalized pair)
    pub height: u32,
    /// Number of pixels marked as differing
    pub diff_pixel_count: u64,
}

/// Render a diff image for a dimension-matched pair.
///
/// Differing pixels (channel delta above `sensitivity`) are drawn in a
/// high-visibility highlight color; matching pixels show the baseline
/// pixel dimmed, so differences read in their spatial context.
///
/// # Errors
///
/// Returns [`CotejarError::Normalization`] when the dimensions differ and
/// [`CotejarError::ImageProcessing`] if PNG encoding fails.
pub fn render(
    baseline: &RgbaImage,
    candidate: &RgbaImage,
    sensitivity: u8,
) -> CotejarResult<DiffArtifact> {
    if baseline.dimensions() != candidate.dimensions() {
        return Err(CotejarError::Normalization {
            baseline_width: baseline.width(),
            baseline_height: baseline.height(),
            candidate_width: candidate.width(),
            candidate_height: candidate.height(),
        });
    }
    let (width, height) = baseline.dimensions();

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixel_count = 0u64;

    for (x, y, out) in diff_img.enumerate_pixels_mut() {
        let base = *baseline.get_pixel(x, y);
        let cand = *candidate.get_pixel(x, y);
        if channel_delta(base, cand) > sensitivity {
            diff_pixel_count += 1;
            *out = HIGHLIGHT;
        } else {
            let Rgba([r, g, b, _]) = base;
            *out = Rgba([r / 2, g / 2, b / 2, 128]);
        }
    }

    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(diff_img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| CotejarError::ImageProcessing {
            message: format!("failed to encode diff image: {e}"),
        })?;

    Ok(DiffArtifact {
        bytes,
        width,
        height,
        diff_pixel_count,
    })
}
