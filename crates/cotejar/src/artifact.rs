//! Capture keys and content-addressed screenshot artifacts.

use crate::result::{CotejarError, CotejarResult};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which role an artifact plays for its capture key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Accepted reference image
    Baseline,
    /// Freshly captured image under evaluation
    Current,
    /// Rendered difference highlight
    Diff,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => write!(f, "baseline"),
            Self::Current => write!(f, "current"),
            Self::Diff => write!(f, "diff"),
        }
    }
}

/// Identifier for one logical screenshot target, minus the variant.
///
/// This is the key the baseline index is organized by: one active
/// baseline per `(test_id, browser, viewport)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineKey {
    /// Logical test identifier
    pub test_id: String,
    /// Browser the capture was taken in (e.g. "chromium")
    pub browser: String,
    /// Viewport label (e.g. "1280x720")
    pub viewport: String,
}

impl BaselineKey {
    /// Create a new baseline key
    pub fn new(
        test_id: impl Into<String>,
        browser: impl Into<String>,
        viewport: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            browser: browser.into(),
            viewport: viewport.into(),
        }
    }

    /// Full capture key for a given variant
    #[must_use]
    pub fn for_variant(&self, variant: Variant) -> CaptureKey {
        CaptureKey {
            test_id: self.test_id.clone(),
            browser: self.browser.clone(),
            viewport: self.viewport.clone(),
            variant,
        }
    }
}

impl fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.test_id, self.browser, self.viewport)
    }
}

/// Identifier tuple distinguishing one stored screenshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureKey {
    /// Logical test identifier
    pub test_id: String,
    /// Browser the capture was taken in
    pub browser: String,
    /// Viewport label
    pub viewport: String,
    /// Role of the artifact under this key
    pub variant: Variant,
}

impl CaptureKey {
    /// The baseline key this capture key belongs to
    #[must_use]
    pub fn baseline_key(&self) -> BaselineKey {
        BaselineKey {
            test_id: self.test_id.clone(),
            browser: self.browser.clone(),
            viewport: self.viewport.clone(),
        }
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.test_id, self.browser, self.viewport, self.variant
        )
    }
}

/// An immutable screenshot with its metadata, identified by content hash
#[derive(Debug, Clone)]
pub struct ScreenshotArtifact {
    /// Capture key this artifact was stored under
    pub key: CaptureKey,
    /// Encoded image bytes (PNG or JPEG)
    pub bytes: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bits per pixel of the decoded image
    pub color_depth: u16,
    /// Lowercase hex SHA-256 of `bytes`
    pub checksum: String,
}

impl ScreenshotArtifact {
    /// Build an artifact from encoded bytes and their decoded image
    #[must_use]
    pub fn new(key: CaptureKey, bytes: Vec<u8>, image: &DynamicImage) -> Self {
        let checksum = checksum(&bytes);
        Self {
            key,
            width: image.width(),
            height: image.height(),
            color_depth: image.color().bits_per_pixel(),
            checksum,
            bytes,
        }
    }

    /// Build an artifact from already-known dimensions (e.g. a rendered diff)
    #[must_use]
    pub fn from_raw(key: CaptureKey, bytes: Vec<u8>, width: u32, height: u32) -> Self {
        let checksum = checksum(&bytes);
        Self {
            key,
            bytes,
            width,
            height,
            color_depth: 32,
            checksum,
        }
    }
}

/// Decode image bytes, surfacing failures as `CorruptArtifact`.
///
/// `context` names the artifact role for the error message so operators
/// can tell a data-integrity problem from a visual regression.
pub fn decode(bytes: &[u8], context: &str) -> CotejarResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| CotejarError::CorruptArtifact {
        context: context.to_string(),
        message: e.to_string(),
    })
}

/// Content hash used to address artifacts in the screenshot store
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{digest:x}")
}
