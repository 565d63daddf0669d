//! The re-encode engine.
//!
//! [`normalize`] combines the pure calculations with codec calls:
//!
//! 1. Decode; the codec applies the embedded orientation.
//! 2. Resize to at most `max_width`, preserving aspect ratio, never enlarging.
//! 3. Encode at the starting setting for the kind.
//! 4. Lossy kinds only: while the output exceeds `max_bytes`, step quality
//!    down and encode the same resized pixels again, stopping at the floor.
//!    An output still over budget at the floor is accepted.

use super::backend::{CodecError, Dimensions, ImageCodec};
use super::calculations::{calculate_target_dimensions, quality_ladder};
use super::params::{EncodeParams, NormalizeConfig, Quality};
use crate::classify::ImageKind;
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Final quality for lossy kinds, `None` for PNG.
    pub quality: Option<u32>,
    /// Number of encodes performed.
    pub attempts: u32,
    pub original: Dimensions,
    pub output: Dimensions,
    /// Whether `bytes` fits in the byte budget.
    pub within_budget: bool,
}

/// Decode, orient, resize and re-encode `bytes` as `kind`.
pub fn normalize<C: ImageCodec>(
    codec: &C,
    bytes: &[u8],
    kind: ImageKind,
    config: &NormalizeConfig,
) -> Result<Normalized> {
    let decoded = codec.decode(bytes)?;
    let original = codec.dimensions(&decoded);
    let (width, height) =
        calculate_target_dimensions((original.width, original.height), config.max_width);

    let image = if (width, height) == (original.width, original.height) {
        decoded
    } else {
        codec.resize(&decoded, width, height)?
    };
    let output = codec.dimensions(&image);

    let initial = EncodeParams::initial(kind, config);
    let mut encoded = codec.encode(&image, &initial)?;
    let mut final_quality = initial.quality();
    let mut attempts = 1;

    if kind.is_lossy() && encoded.len() as u64 > config.max_bytes {
        let start = initial.quality().map(Quality::value).unwrap_or_default();
        for q in quality_ladder(start, config.min_quality, config.quality_step)
            .into_iter()
            .skip(1)
        {
            let params = initial.with_quality(Quality::new(q));
            encoded = codec.encode(&image, &params)?;
            final_quality = params.quality();
            attempts += 1;
            debug!(quality = q, bytes = encoded.len(), "re-encoded at lower quality");
            if encoded.len() as u64 <= config.max_bytes {
                break;
            }
        }
    }

    Ok(Normalized {
        within_budget: encoded.len() as u64 <= config.max_bytes,
        bytes: encoded,
        content_type: kind.content_type(),
        quality: final_quality.map(Quality::value),
        attempts,
        original,
        output,
    })
}
