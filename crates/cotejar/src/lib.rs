//! Cotejar: Visual Regression Testing Engine
//!
//! Cotejar (Spanish: "to compare side by side") detects unintended visual
//! changes in a rendered web UI by comparing captured screenshots against
//! accepted baselines, producing a deterministic verdict plus visual
//! evidence. It consumes already-captured image buffers with metadata; it
//! never drives a browser and never renders human-facing reports.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     COTEJAR Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  (key, image) ──► Regression   ──► Baseline    ──► Screenshot    │
//! │                   Evaluator        Manager         Store         │
//! │                        │                                         │
//! │                        ├─► Normalizer ─► Similarity ─► Verdict   │
//! │                        │                  Engine                 │
//! │                        └─► Diff Renderer (on fail only)          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use cotejar::{
//!     BaselineKey, BaselineManager, MemoryScreenshotStore, RegressionEvaluator,
//!     ThresholdPolicy, Verdict,
//! };
//! use image::{ExtendedColorType, ImageEncoder};
//!
//! let mut png = Vec::new();
//! let img = image::RgbaImage::from_pixel(100, 100, image::Rgba([255, 255, 255, 255]));
//! image::codecs::png::PngEncoder::new(&mut png)
//!     .write_image(img.as_raw(), 100, 100, ExtendedColorType::Rgba8)
//!     .unwrap();
//!
//! let evaluator = RegressionEvaluator::new(MemoryScreenshotStore::new(), BaselineManager::new());
//! let key = BaselineKey::new("landing", "chromium", "1280x720");
//! let policy = ThresholdPolicy::default();
//!
//! let first = evaluator.evaluate(&key, &png, &policy).unwrap();
//! assert_eq!(first.verdict, Verdict::BaselineCreated);
//!
//! let second = evaluator.evaluate(&key, &png, &policy).unwrap();
//! assert_eq!(second.verdict, Verdict::Pass);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod artifact;
mod baseline;
mod diff;
mod evaluator;
mod normalize;
mod result;
mod similarity;
mod store;

pub use artifact::{checksum, decode, BaselineKey, CaptureKey, ScreenshotArtifact, Variant};
pub use baseline::{BaselineManager, BaselineRecord};
pub use diff::{render as render_diff, DiffArtifact};
pub use evaluator::{ComparisonResult, FailureReason, RegressionEvaluator, Verdict};
pub use normalize::{area_average_resize, NormalizedPair, Normalizer};
pub use result::{CotejarError, CotejarResult};
pub use similarity::{compare, MetricScores, MetricWeights, ThresholdPolicy};
pub use store::{FsScreenshotStore, MemoryScreenshotStore, ScreenshotStore};
