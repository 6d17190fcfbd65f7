use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamepilot_core_types::{FrameId, Point, Rect};
use image::{DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::errors::MatchError;

/// One captured image of the target surface.
///
/// The grayscale plane is computed once at construction so batch lookups
/// against the same frame share it. Cloning is cheap.
#[derive(Clone)]
pub struct Frame {
    pub id: FrameId,
    pub captured_at: DateTime<Utc>,
    rgba: Arc<RgbaImage>,
    luma: Arc<GrayImage>,
}

impl Frame {
    pub fn from_rgba(rgba: RgbaImage) -> Self {
        let luma = DynamicImage::ImageRgba8(rgba.clone()).to_luma8();
        Self {
            id: FrameId::new(),
            captured_at: Utc::now(),
            rgba: Arc::new(rgba),
            luma: Arc::new(luma),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        let luma = image.to_luma8();
        Self {
            id: FrameId::new(),
            captured_at: Utc::now(),
            rgba: Arc::new(image.into_rgba8()),
            luma: Arc::new(luma),
        }
    }

    /// Decodes encoded capture bytes (PNG, JPEG, BMP).
    pub fn decode(bytes: &[u8]) -> Result<Self, MatchError> {
        image::load_from_memory(bytes)
            .map(Self::from_dynamic)
            .map_err(|err| MatchError::Decode(err.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.luma.width()
    }

    pub fn height(&self) -> u32 {
        self.luma.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id.0)
            .field("size", &(self.width(), self.height()))
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Outcome of one template lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// `<type>/<name>` of the template.
    pub template: String,
    pub found: bool,
    /// Similarity at the best offset, in `[0, 1]`.
    pub confidence: f64,
    /// Center of the match; only set when `found`.
    pub position: Option<Point>,
    /// Best-scoring placement, set whenever a score could be computed.
    pub bounds: Option<Rect>,
}

impl MatchResult {
    pub fn not_found(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            found: false,
            confidence: 0.0,
            position: None,
            bounds: None,
        }
    }
}

/// Inclusive per-channel RGB range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorRange {
    pub min: [u8; 3],
    pub max: [u8; 3],
    /// Minimum share of matching pixels for the detection to count.
    #[serde(default)]
    pub min_ratio: f64,
}

impl ColorRange {
    pub fn new(min: [u8; 3], max: [u8; 3]) -> Self {
        Self {
            min,
            max,
            min_ratio: 0.0,
        }
    }

    pub fn with_min_ratio(mut self, ratio: f64) -> Self {
        self.min_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|c| rgb[c] >= self.min[c] && rgb[c] <= self.max[c])
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorMatch {
    pub found: bool,
    pub matching_pixels: u64,
    pub total_pixels: u64,
}

impl ColorMatch {
    pub fn ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.matching_pixels as f64 / self.total_pixels as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchEngineConfig {
    /// Frames whose longer side exceeds this are searched on a downscaled
    /// copy first, then refined at full resolution.
    pub max_search_dim: u32,
    /// Extra pixels around the coarse hit searched during refinement.
    pub refine_margin: u32,
    /// Below this size (after downscaling) a needle loses too much detail
    /// and the full-resolution search is used instead.
    pub min_coarse_template: u32,
}

impl Default for MatchEngineConfig {
    fn default() -> Self {
        Self {
            max_search_dim: 640,
            refine_margin: 4,
            min_coarse_template: 8,
        }
    }
}
