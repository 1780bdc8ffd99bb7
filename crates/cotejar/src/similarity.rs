//! Multi-metric image similarity scoring.
//!
//! Three independent signals are computed over a dimension-matched pair
//! and combined under a configurable aggregation policy:
//!
//! 1. **Pixel-difference ratio** — fraction of pixels whose channel delta
//!    exceeds the policy sensitivity, normalized against the ratio at
//!    which the metric bottoms out ([`ThresholdPolicy::max_diff_pixel_ratio`]).
//! 2. **Structural similarity** — windowed SSIM over 8×8 luminance blocks;
//!    catches structural shifts a raw pixel diff underweights.
//! 3. **Histogram correlation** — Pearson correlation of 256-bin luminance
//!    histograms; robust to small positional shifts, catches global
//!    color/theme changes.
//!
//! Scoring is single-threaded and accumulates in fixed row-major order, so
//! identical input buffers always produce bit-for-bit identical scores.

use crate::result::{CotejarError, CotejarResult};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// SSIM window edge length in pixels
const SSIM_WINDOW: u32 = 8;
/// SSIM stabilizer C1 = (0.01 * 255)^2
const SSIM_C1: f64 = 6.5025;
/// SSIM stabilizer C2 = (0.03 * 255)^2
const SSIM_C2: f64 = 58.5225;

/// Per-metric weights for the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    /// Weight of the pixel-difference metric
    pub pixel_diff: f64,
    /// Weight of the structural-similarity metric
    pub structural: f64,
    /// Weight of the histogram-correlation metric
    pub histogram: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            pixel_diff: 0.5,
            structural: 0.35,
            histogram: 0.15,
        }
    }
}

/// Named numeric parameters governing one comparison call.
///
/// Immutable; supplied per call so distinct suites can run under distinct
/// tolerances against the same engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Minimum aggregate similarity score to pass
    pub pass_threshold: f64,
    /// Minimum per-channel delta (0-255) counted as "different"
    pub sensitivity: u8,
    /// Differing-pixel ratio at which the pixel metric scores zero.
    ///
    /// The raw ratio is divided by this value, so with the default 0.05 a
    /// capture where 1% of pixels moved scores 0.8 on the pixel metric and
    /// a 5% change bottoms out at 0. Must be positive.
    pub max_diff_pixel_ratio: f64,
    /// Aggregation weights
    pub weights: MetricWeights,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: 0.95,
            sensitivity: 10, // tolerates anti-aliasing noise
            max_diff_pixel_ratio: 0.05,
            weights: MetricWeights::default(),
        }
    }
}

impl ThresholdPolicy {
    /// Create a policy with default parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pass threshold
    #[must_use]
    pub const fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Set the per-channel sensitivity
    #[must_use]
    pub const fn with_sensitivity(mut self, sensitivity: u8) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the ratio at which the pixel metric scores zero
    #[must_use]
    pub const fn with_max_diff_pixel_ratio(mut self, ratio: f64) -> Self {
        self.max_diff_pixel_ratio = ratio;
        self
    }

    /// Set the aggregation weights
    #[must_use]
    pub const fn with_weights(mut self, weights: MetricWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Per-metric scores plus their weighted aggregate, all in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    /// Pixel-difference metric score
    pub pixel_diff: f64,
    /// Raw fraction of pixels whose channel delta exceeded sensitivity
    pub diff_pixel_ratio: f64,
    /// Mean windowed structural similarity
    pub structural: f64,
    /// Luminance histogram correlation
    pub histogram: f64,
    /// Weighted combination of the three metrics
    pub aggregate: f64,
}

/// Largest per-channel RGB delta between two pixels; alpha is ignored
pub(crate) fn channel_delta(a: Rgba<u8>, b: Rgba<u8>) -> u8 {
    let Rgba([r1, g1, b1, _]) = a;
    let Rgba([r2, g2, b2, _]) = b;
    let dr = r1.abs_diff(r2);
    let dg = g1.abs_diff(g2);
    let db = b1.abs_diff(b2);
    dr.max(dg).max(db)
}

fn luminance(p: Rgba<u8>) -> f64 {
    let Rgba([r, g, b, _]) = p;
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}

/// Compute all metric scores for a dimension-matched pair.
///
/// # Errors
///
/// Returns [`CotejarError::Normalization`] when the dimensions differ;
/// run the pair through [`crate::normalize::Normalizer`] first.
pub fn compare(
    a: &RgbaImage,
    b: &RgbaImage,
    policy: &ThresholdPolicy,
) -> CotejarResult<MetricScores> {
    if a.dimensions() != b.dimensions() {
        return Err(CotejarError::Normalization {
            baseline_width: a.width(),
            baseline_height: a.height(),
            candidate_width: b.width(),
            candidate_height: b.height(),
        });
    }

    let (pixel_diff, diff_pixel_ratio) = pixel_difference_score(a, b, policy);
    let structural = structural_score(a, b);
    let histogram = histogram_score(a, b);

    let weights = policy.weights;
    let aggregate = (weights.pixel_diff * pixel_diff
        + weights.structural * structural
        + weights.histogram * histogram)
        .clamp(0.0, 1.0);

    Ok(MetricScores {
        pixel_diff,
        diff_pixel_ratio,
        structural,
        histogram,
        aggregate,
    })
}

/// Signal 1: fraction of pixels whose channel delta exceeds sensitivity.
///
/// Returns `(score, raw_ratio)`.
fn pixel_difference_score(a: &RgbaImage, b: &RgbaImage, policy: &ThresholdPolicy) -> (f64, f64) {
    let total = u64::from(a.width()) * u64::from(a.height());
    if total == 0 {
        return (1.0, 0.0);
    }

    let mut differing = 0u64;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        if channel_delta(*pa, *pb) > policy.sensitivity {
            differing += 1;
        }
    }

    let ratio = differing as f64 / total as f64;
    if ratio == 0.0 {
        return (1.0, 0.0);
    }
    let scale = policy.max_diff_pixel_ratio.max(f64::EPSILON);
    ((1.0 - ratio / scale).max(0.0), ratio)
}

/// Signal 2: mean SSIM over 8×8 luminance windows, clamped to [0, 1].
///
/// Partial windows at the right/bottom edges participate with their
/// actual pixel count.
fn structural_score(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let (width, height) = a.dimensions();
    if width == 0 || height == 0 {
        return 1.0;
    }

    let mut sum = 0.0f64;
    let mut windows = 0u64;

    let mut wy = 0;
    while wy < height {
        let wh = SSIM_WINDOW.min(height - wy);
        let mut wx = 0;
        while wx < width {
            let ww = SSIM_WINDOW.min(width - wx);
            sum += window_ssim(a, b, wx, wy, ww, wh);
            windows += 1;
            wx += SSIM_WINDOW;
        }
        wy += SSIM_WINDOW;
    }

    (sum / windows as f64).clamp(0.0, 1.0)
}

fn window_ssim(a: &RgbaImage, b: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let n = f64::from(w) * f64::from(h);
    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    let mut sum_aa = 0.0f64;
    let mut sum_bb = 0.0f64;
    let mut sum_ab = 0.0f64;

    for py in y..y + h {
        for px in x..x + w {
            let la = luminance(*a.get_pixel(px, py));
            let lb = luminance(*b.get_pixel(px, py));
            sum_a += la;
            sum_b += lb;
            sum_aa += la * la;
            sum_bb += lb * lb;
            sum_ab += la * lb;
        }
    }

    let mu_a = sum_a / n;
    let mu_b = sum_b / n;
    let var_a = sum_aa / n - mu_a * mu_a;
    let var_b = sum_bb / n - mu_b * mu_b;
    let cov = sum_ab / n - mu_a * mu_b;

    let numerator = (2.0 * (mu_a * mu_b) + SSIM_C1) * (2.0 * cov + SSIM_C2);
    let denominator = (mu_a * mu_a + mu_b * mu_b + SSIM_C1) * (var_a + var_b + SSIM_C2);
    numerator / denominator
}

/// Signal 3: Pearson correlation of 256-bin luminance histograms.
fn histogram_score(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let hist_a = luminance_histogram(a);
    let hist_b = luminance_histogram(b);

    // Equal histograms (including the zero-variance uniform case) are a
    // perfect match by definition.
    if hist_a == hist_b {
        return 1.0;
    }

    let n = hist_a.len() as f64;
    let mean_a = hist_a.iter().map(|&c| c as f64).sum::<f64>() / n;
    let mean_b = hist_b.iter().map(|&c| c as f64).sum::<f64>() / n;

    let mut cov = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for (&ca, &cb) in hist_a.iter().zip(hist_b.iter()) {
        let da = ca as f64 - mean_a;
        let db = cb as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(0.0, 1.0)
}

fn luminance_histogram(img: &RgbaImage) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for pixel in img.pixels() {
        let bin = luminance(*pixel).round().clamp(0.0, 255.0) as usize;
        bins[bin] += 1;
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = Rgba(color);
        }
        img
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255]);
        }
        img
    }

    fn with_red_block(base: &RgbaImage, x0: u32, y0: u32, side: u32) -> RgbaImage {
        let mut img = base.clone();
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        img
    }

    #[test]
    fn test_identical_images_score_exactly_one() {
        let img = gradient(64, 64);
        let scores = compare(&img, &img, &ThresholdPolicy::default()).unwrap();
        assert_eq!(scores.pixel_diff, 1.0);
        assert_eq!(scores.diff_pixel_ratio, 0.0);
        assert_eq!(scores.structural, 1.0);
        assert_eq!(scores.histogram, 1.0);
        assert_eq!(scores.aggregate, 1.0);
    }

    #[test]
    fn test_deltas_below_sensitivity_do_not_count() {
        let a = solid(20, 20, [100, 100, 100, 255]);
        let b = solid(20, 20, [105, 105, 105, 255]);
        let scores = compare(&a, &b, &ThresholdPolicy::default()).unwrap();
        assert_eq!(scores.diff_pixel_ratio, 0.0);
        assert_eq!(scores.pixel_diff, 1.0);
    }

    #[test]
    fn test_deltas_above_sensitivity_count() {
        let a = solid(20, 20, [100, 100, 100, 255]);
        let b = solid(20, 20, [150, 100, 100, 255]);
        let scores = compare(&a, &b, &ThresholdPolicy::default()).unwrap();
        assert_eq!(scores.diff_pixel_ratio, 1.0);
        assert_eq!(scores.pixel_diff, 0.0);
    }

    #[test]
    fn test_red_block_scenario_drops_below_default_threshold() {
        // 10x10 red block in a 100x100 white image: 1% of pixels differ
        let baseline = solid(100, 100, [255, 255, 255, 255]);
        let candidate = with_red_block(&baseline, 45, 45, 10);
        let policy = ThresholdPolicy::default();
        let scores = compare(&baseline, &candidate, &policy).unwrap();
        assert!((scores.diff_pixel_ratio - 0.01).abs() < 1e-12);
        assert!((scores.pixel_diff - 0.8).abs() < 1e-12);
        assert!(scores.aggregate < policy.pass_threshold);
    }

    #[test]
    fn test_fully_different_images_bottom_out() {
        let a = solid(32, 32, [255, 255, 255, 255]);
        let b = solid(32, 32, [0, 0, 0, 255]);
        let scores = compare(&a, &b, &ThresholdPolicy::default()).unwrap();
        assert_eq!(scores.pixel_diff, 0.0);
        assert!(scores.structural < 0.1);
        assert_eq!(scores.histogram, 0.0);
        assert!(scores.aggregate < 0.1);
    }

    #[test]
    fn test_histogram_catches_global_color_shift() {
        let a = solid(32, 32, [255, 255, 255, 255]);
        let b = solid(32, 32, [128, 128, 128, 255]);
        let scores = compare(&a, &b, &ThresholdPolicy::default()).unwrap();
        // Non-overlapping single-spike histograms are anti-correlated
        assert_eq!(scores.histogram, 0.0);
    }

    #[test]
    fn test_weights_isolate_pixel_metric() {
        let baseline = solid(100, 100, [255, 255, 255, 255]);
        let candidate = with_red_block(&baseline, 0, 0, 10);
        let policy = ThresholdPolicy::default().with_weights(MetricWeights {
            pixel_diff: 1.0,
            structural: 0.0,
            histogram: 0.0,
        });
        let scores = compare(&baseline, &candidate, &policy).unwrap();
        assert!((scores.aggregate - scores.pixel_diff).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_non_increasing_in_altered_area() {
        let baseline = solid(100, 100, [255, 255, 255, 255]);
        let policy = ThresholdPolicy::default();
        let mut previous = f64::INFINITY;
        for side in [0u32, 5, 10, 20, 40] {
            let candidate = if side == 0 {
                baseline.clone()
            } else {
                with_red_block(&baseline, 0, 0, side)
            };
            let scores = compare(&baseline, &candidate, &policy).unwrap();
            assert!(
                scores.aggregate <= previous,
                "aggregate rose from {previous} to {} at side {side}",
                scores.aggregate
            );
            previous = scores.aggregate;
        }
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let a = solid(10, 10, [255, 255, 255, 255]);
        let b = solid(12, 10, [255, 255, 255, 255]);
        let err = compare(&a, &b, &ThresholdPolicy::default()).unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn test_channel_delta_takes_max_channel() {
        assert_eq!(
            channel_delta(Rgba([10, 10, 10, 255]), Rgba([10, 10, 10, 0])),
            0
        );
        assert_eq!(
            channel_delta(Rgba([0, 0, 0, 255]), Rgba([5, 200, 30, 255])),
            200
        );
    }

    #[test]
    fn test_policy_builder() {
        let policy = ThresholdPolicy::new()
            .with_pass_threshold(0.9)
            .with_sensitivity(30)
            .with_max_diff_pixel_ratio(0.1);
        assert!((policy.pass_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(policy.sensitivity, 30);
        assert!((policy.max_diff_pixel_ratio - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_policy_serde_roundtrip() {
        let policy = ThresholdPolicy::default().with_sensitivity(20);
        let json = serde_json::to_string(&policy).unwrap();
        let back: ThresholdPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Paint the first `count` pixels (row-major) far above sensitivity
        fn with_prefix_painted(base: &RgbaImage, count: u32) -> RgbaImage {
            let mut img = base.clone();
            let width = img.width();
            for i in 0..count {
                img.put_pixel(i % width, i / width, Rgba([255, 0, 0, 255]));
            }
            img
        }

        proptest! {
            #[test]
            fn pixel_score_non_increasing_in_altered_pixels(
                k1 in 0u32..=1024,
                k2 in 0u32..=1024,
            ) {
                let (low, high) = if k1 <= k2 { (k1, k2) } else { (k2, k1) };
                let base = solid(32, 32, [255, 255, 255, 255]);
                let policy = ThresholdPolicy::default();
                let few = compare(&base, &with_prefix_painted(&base, low), &policy).unwrap();
                let many = compare(&base, &with_prefix_painted(&base, high), &policy).unwrap();
                prop_assert!(many.pixel_diff <= few.pixel_diff);
                prop_assert!(many.diff_pixel_ratio >= few.diff_pixel_ratio);
            }

            #[test]
            fn scores_are_reproducible(seed in 0u64..1000) {
                let mut img = solid(24, 24, [0, 0, 0, 255]);
                for (i, pixel) in img.pixels_mut().enumerate() {
                    let v = (seed.wrapping_mul(i as u64 + 1) % 256) as u8;
                    *pixel = Rgba([v, v.wrapping_add(40), v / 2, 255]);
                }
                let other = gradient(24, 24);
                let policy = ThresholdPolicy::default();
                let first = compare(&img, &other, &policy).unwrap();
                let second = compare(&img, &other, &policy).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn aggregate_stays_in_unit_interval(side in 0u32..=32) {
                let base = gradient(32, 32);
                let candidate = if side == 0 {
                    base.clone()
                } else {
                    with_red_block(&base, 0, 0, side)
                };
                let scores = compare(&base, &candidate, &ThresholdPolicy::default()).unwrap();
                prop_assert!((0.0..=1.0).contains(&scores.aggregate));
                prop_assert!((0.0..=1.0).contains(&scores.structural));
                prop_assert!((0.0..=1.0).contains(&scores.histogram));
            }
        }
    }
}
