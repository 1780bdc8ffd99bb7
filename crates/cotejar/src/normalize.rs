//! Cross-browser normalization: align two captures to comparable dimensions.
//!
//! Captures of the same page differ in pixel dimensions across DPI settings
//! and browsers. When the aspect ratios agree (within tolerance) the
//! candidate is rescaled to the baseline's dimensions with area-averaging
//! resampling; a genuine aspect-ratio change is a hard stop, never a silent
//! crop, because cropping would hide real layout regressions.

use crate::result::{CotejarError, CotejarResult};
use image::{Rgba, RgbaImage};

/// A dimension-matched pair of images, ready for per-pixel operations
#[derive(Debug, Clone)]
pub struct NormalizedPair {
    /// Baseline image at its original dimensions
    pub baseline: RgbaImage,
    /// Candidate image, rescaled to the baseline's dimensions if needed
    pub candidate: RgbaImage,
}

/// Aligns baseline/candidate pairs for comparison
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Maximum relative aspect-ratio difference accepted for rescaling
    pub aspect_ratio_tolerance: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            aspect_ratio_tolerance: 0.01, // covers DPI rounding across browsers
        }
    }
}

impl Normalizer {
    /// Create a normalizer with the default tolerance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aspect-ratio tolerance
    #[must_use]
    pub const fn with_aspect_ratio_tolerance(mut self, tolerance: f64) -> Self {
        self.aspect_ratio_tolerance = tolerance;
        self
    }

    /// Align `candidate` to `baseline`'s dimensions.
    ///
    /// Deterministic: the same input pair always yields byte-identical
    /// output images.
    ///
    /// # Errors
    ///
    /// Returns [`CotejarError::Normalization`] when the aspect ratios
    /// differ beyond tolerance.
    pub fn normalize(
        &self,
        baseline: &RgbaImage,
        candidate: &RgbaImage,
    ) -> CotejarResult<NormalizedPair> {
        let (bw, bh) = baseline.dimensions();
        let (cw, ch) = candidate.dimensions();

        if (bw, bh) == (cw, ch) {
            return Ok(NormalizedPair {
                baseline: baseline.clone(),
                candidate: candidate.clone(),
            });
        }

        if bw == 0 || bh == 0 || cw == 0 || ch == 0 {
            return Err(CotejarError::Normalization {
                baseline_width: bw,
                baseline_height: bh,
                candidate_width: cw,
                candidate_height: ch,
            });
        }

        let baseline_ratio = f64::from(bw) / f64::from(bh);
        let candidate_ratio = f64::from(cw) / f64::from(ch);
        let relative_diff = ((baseline_ratio - candidate_ratio) / baseline_ratio).abs();

        if relative_diff > self.aspect_ratio_tolerance {
            return Err(CotejarError::Normalization {
                baseline_width: bw,
                baseline_height: bh,
                candidate_width: cw,
                candidate_height: ch,
            });
        }

        tracing::debug!(
            from = %format!("{cw}x{ch}"),
            to = %format!("{bw}x{bh}"),
            "rescaling candidate to baseline dimensions"
        );

        Ok(NormalizedPair {
            baseline: baseline.clone(),
            candidate: area_average_resize(candidate, bw, bh),
        })
    }
}

/// Area-averaging resample: each destination pixel is the mean of the
/// source rectangle it covers, with fractional edge coverage weighted.
///
/// Averaging over the covered area avoids the aliasing artifacts a
/// point-sampling resize would introduce, which would otherwise inflate
/// difference scores on downscaled captures. Accumulation runs in fixed
/// row-major order so the output is bit-for-bit reproducible.
#[must_use]
pub fn area_average_resize(src: &RgbaImage, dst_width: u32, dst_height: u32) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    if (sw, sh) == (dst_width, dst_height) {
        return src.clone();
    }

    let x_ratio = f64::from(sw) / f64::from(dst_width);
    let y_ratio = f64::from(sh) / f64::from(dst_height);
    let mut out = RgbaImage::new(dst_width, dst_height);

    for dy in 0..dst_height {
        let y0 = f64::from(dy) * y_ratio;
        let y1 = f64::from(dy + 1) * y_ratio;
        let sy_start = y0.floor() as u32;
        let sy_end = (y1.ceil() as u32).min(sh);

        for dx in 0..dst_width {
            let x0 = f64::from(dx) * x_ratio;
            let x1 = f64::from(dx + 1) * x_ratio;
            let sx_start = x0.floor() as u32;
            let sx_end = (x1.ceil() as u32).min(sw);

            let mut acc = [0.0f64; 4];
            let mut area = 0.0f64;

            for sy in sy_start..sy_end {
                let wy = (f64::from(sy + 1).min(y1) - f64::from(sy).max(y0)).max(0.0);
                for sx in sx_start..sx_end {
                    let wx = (f64::from(sx + 1).min(x1) - f64::from(sx).max(x0)).max(0.0);
                    let weight = wx * wy;
                    let Rgba(p) = *src.get_pixel(sx, sy);
                    for (a, c) in acc.iter_mut().zip(p.iter()) {
                        *a += weight * f64::from(*c);
                    }
                    area += weight;
                }
            }

            let mut px = [0u8; 4];
            if area > 0.0 {
                for (dst, a) in px.iter_mut().zip(acc.iter()) {
                    *dst = (a / area).round().clamp(0.0, 255.0) as u8;
                }
            }
            out.put_pixel(dx, dy, Rgba(px));
        }
    }

    out
}
