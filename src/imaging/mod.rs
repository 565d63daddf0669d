//! Image re-encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode + orient** | `image::ImageReader`, `apply_orientation` |
//! | **Resize** | Lanczos3, width-capped, no enlargement |
//! | **JPEG / WebP** | quality 75, stepped down to 50 to meet the byte budget |
//! | **PNG** | best compression + `oxipng` palette reduction, no retries |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math and quality steps (unit testable)
//! - **Parameters**: Data structures describing encode settings
//! - **Backend**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Operations**: [`normalize`], the engine combining calculations + codec

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{CodecError, Dimensions, ImageCodec};
pub use calculations::{calculate_target_dimensions, quality_ladder};
pub use operations::{Normalized, normalize};
pub use params::{EncodeParams, NormalizeConfig, Quality};
pub use rust_backend::RustCodec;
