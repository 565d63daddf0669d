//! Production codec built on the `image` crate ecosystem.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader` with guessed format |
//! | Orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the given quality |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy at the given quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (best compression) then `oxipng` palette/bit-depth reduction |

use super::backend::{CodecError, Dimensions, ImageCodec};
use super::params::EncodeParams;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;

/// oxipng preset used for PNG output; 6 is the strongest non-zopfli preset.
const PNG_OPTIMIZE_PRESET: u8 = 6;

/// Codec using the `image`, `webp`, and `oxipng` crates.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    // JPEG has no alpha channel and no 16-bit samples
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| CodecError::Encode(format!("JPEG: {e}")))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, CodecError> {
    // libwebp only takes 8-bit RGB / RGBA
    let eight_bit = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&eight_bit)
        .map_err(|e| CodecError::Encode(format!("WebP: {e}")))?;
    Ok(encoder.encode(quality).to_vec())
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| CodecError::Encode(format!("PNG: {e}")))?;

    let mut options = oxipng::Options::from_preset(PNG_OPTIMIZE_PRESET);
    options.palette_reduction = true;
    options.bit_depth_reduction = true;
    options.color_type_reduction = true;
    oxipng::optimize_from_memory(&buf, &options)
        .map_err(|e| CodecError::Encode(format!("PNG optimize: {e}")))
}

impl ImageCodec for RustCodec {
    type Image = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        // Missing or unreadable EXIF means "already upright"
        let orientation = decoder.orientation().ok();
        let mut img =
            DynamicImage::from_decoder(decoder).map_err(|e| CodecError::Decode(e.to_string()))?;
        if let Some(orientation) = orientation {
            img.apply_orientation(orientation);
        }
        Ok(img)
    }

    fn dimensions(&self, image: &DynamicImage) -> Dimensions {
        Dimensions {
            width: image.width(),
            height: image.height(),
        }
    }

    fn resize(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::Resize(format!(
                "invalid target size {width}x{height}"
            )));
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        match params {
            EncodeParams::Jpeg { quality } => encode_jpeg(image, quality.value() as u8),
            EncodeParams::WebP { quality } => encode_webp(image, quality.value() as f32),
            EncodeParams::Png => encode_png(image),
        }
    }
}
