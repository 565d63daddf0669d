//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between [`operations`](super::operations) (which decides sizes
//! and quality steps) and the [`backend`](super::backend) (which does the
//! pixel work), so the engine can be exercised with a mock codec.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`EncodeParams`]: Target format plus its quality/compression setting.
//! - [`NormalizeConfig`]: Width limit, starting qualities, floor, step, byte budget.

use crate::classify::ImageKind;
use crate::gate::DEFAULT_MAX_BYTES;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// How to encode one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeParams {
    Jpeg { quality: Quality },
    WebP { quality: Quality },
    /// Maximum compression effort with palette reduction; lossless.
    Png,
}

impl EncodeParams {
    /// Starting parameters for a kind under `config`.
    pub fn initial(kind: ImageKind, config: &NormalizeConfig) -> Self {
        match kind {
            ImageKind::Jpeg => EncodeParams::Jpeg {
                quality: Quality::new(config.jpeg_quality),
            },
            ImageKind::WebP => EncodeParams::WebP {
                quality: Quality::new(config.webp_quality),
            },
            ImageKind::Png => EncodeParams::Png,
        }
    }

    /// Same format at a different quality; PNG is returned unchanged.
    pub fn with_quality(self, quality: Quality) -> Self {
        match self {
            EncodeParams::Jpeg { .. } => EncodeParams::Jpeg { quality },
            EncodeParams::WebP { .. } => EncodeParams::WebP { quality },
            EncodeParams::Png => EncodeParams::Png,
        }
    }

    pub fn quality(&self) -> Option<Quality> {
        match self {
            EncodeParams::Jpeg { quality } | EncodeParams::WebP { quality } => Some(*quality),
            EncodeParams::Png => None,
        }
    }
}

/// Settings for the re-encode engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeConfig {
    pub max_width: u32,
    pub jpeg_quality: u32,
    pub webp_quality: u32,
    pub min_quality: u32,
    pub quality_step: u32,
    pub max_bytes: u64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_width: 800,
            jpeg_quality: 75,
            webp_quality: 75,
            min_quality: 50,
            quality_step: 5,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}
