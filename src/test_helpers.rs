//! Shared test utilities for the deario-images test suite.
//!
//! Provides synthetic images, encoded fixtures, and store seeding helpers so
//! unit tests never depend on files on disk.
//!
//! # Usage
//!
//! ```rust
//! use crate::storage::MemoryStore;
//! use crate::test_helpers::*;
//!
//! let store = MemoryStore::new();
//! let object = seed(&store, "diary/2024-05-01/u1/20240501/1.jpg", noisy_jpeg(2400, 1800), "image/jpeg");
//! assert!(store.metadata(&object).unwrap().size_bytes > 600 * 1024);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::BTreeMap;

use crate::storage::{MemoryStore, ObjectRef};

pub const BUCKET: &str = "deario-test.appspot.com";

// =========================================================================
// Synthetic pixels
// =========================================================================

/// Deterministic xorshift noise; compresses badly, so JPEGs stay large.
fn noise(seed: u32) -> impl FnMut() -> u8 {
    let mut state = seed.max(1);
    move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
    }
}

/// RGB image filled with deterministic noise.
pub fn noisy_rgb(width: u32, height: u32) -> DynamicImage {
    let mut next = noise(width.wrapping_mul(31).wrapping_add(height));
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([next(), next(), next()])
    }))
}

/// RGBA gradient with a horizontal alpha ramp.
pub fn rgba_with_alpha(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        let alpha = (x * 255 / width.max(1)) as u8;
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, alpha])
    }))
}

// =========================================================================
// Encoded fixtures
// =========================================================================

/// Noise encoded as JPEG at quality 95.
pub fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    noisy_rgb(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 95))
        .unwrap();
    buf
}

/// Noise encoded as PNG.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    noisy_rgb(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Insert an Exif APP1 segment carrying `orientation` right after the JPEG
/// SOI marker.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let mut exif = b"Exif\0\0".to_vec();
    // Big-endian TIFF header, IFD0 at offset 8
    exif.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
    // One entry: Orientation (0x0112), SHORT, count 1
    exif.extend_from_slice(&1u16.to_be_bytes());
    exif.extend_from_slice(&0x0112u16.to_be_bytes());
    exif.extend_from_slice(&3u16.to_be_bytes());
    exif.extend_from_slice(&1u32.to_be_bytes());
    exif.extend_from_slice(&orientation.to_be_bytes());
    exif.extend_from_slice(&[0, 0]);
    // No next IFD
    exif.extend_from_slice(&0u32.to_be_bytes());

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&exif);
    out.extend_from_slice(&jpeg[2..]);
    out
}

// =========================================================================
// Store seeding
// =========================================================================

pub fn object(path: &str) -> ObjectRef {
    ObjectRef::new(BUCKET, path)
}

pub fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Insert an untagged upload into `store` and return its reference.
pub fn seed(store: &MemoryStore, path: &str, bytes: Vec<u8>, content_type: &str) -> ObjectRef {
    let object = object(path);
    store.insert(&object, bytes, content_type, BTreeMap::new());
    object
}
