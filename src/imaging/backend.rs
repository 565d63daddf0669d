//! Image codec trait and shared types.
//!
//! The [`ImageCodec`] trait defines the three operations the re-encode
//! engine needs: decode (upright), resize, and encode.
//!
//! The production implementation is
//! [`RustCodec`](super::rust_backend::RustCodec). Tests use a mock that
//! records operations and reports scripted encoded sizes.

use super::params::EncodeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("resize failed: {0}")]
    Resize(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codecs.
///
/// `decode` must return pixels that are already upright: any embedded
/// orientation is applied there and not carried into the output.
pub trait ImageCodec: Sync {
    /// In-memory decoded image.
    type Image;

    /// Decode bytes and apply the embedded orientation.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, CodecError>;

    /// Dimensions of a decoded image.
    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    /// Resize to exactly `width` x `height`.
    fn resize(&self, image: &Self::Image, width: u32, height: u32)
    -> Result<Self::Image, CodecError>;

    /// Encode to bytes.
    fn encode(&self, image: &Self::Image, params: &EncodeParams) -> Result<Vec<u8>, CodecError>;
}
