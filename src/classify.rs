//! Format classification from declared content type and file extension.
//!
//! The declared content type wins: it is lower-cased and tested for the
//! substrings `jpeg`, `png`, `webp` in that order. Only when none matches does
//! the file extension decide. Nothing here looks at the bytes.

use std::fmt;

/// Image formats the pipeline knows how to re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    /// Canonical MIME type written back with the normalized bytes.
    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::WebP => "image/webp",
        }
    }

    /// Whether the encoder has a quality knob the byte budget can turn.
    pub fn is_lossy(self) -> bool {
        matches!(self, ImageKind::Jpeg | ImageKind::WebP)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
            ImageKind::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Supported {
        kind: ImageKind,
        content_type: &'static str,
    },
    /// Carries whatever content type was declared, possibly empty.
    Unsupported { content_type: String },
}

impl Classification {
    pub fn kind(&self) -> Option<ImageKind> {
        match self {
            Classification::Supported { kind, .. } => Some(*kind),
            Classification::Unsupported { .. } => None,
        }
    }
}

/// Classify an object from its declared content type and path.
pub fn classify(content_type: &str, path: &str) -> Classification {
    let kind = kind_from_content_type(content_type).or_else(|| kind_from_extension(path));
    match kind {
        Some(kind) => Classification::Supported {
            kind,
            content_type: kind.content_type(),
        },
        None => Classification::Unsupported {
            content_type: content_type.to_string(),
        },
    }
}

fn kind_from_content_type(content_type: &str) -> Option<ImageKind> {
    let ct = content_type.to_lowercase();
    if ct.contains("jpeg") {
        Some(ImageKind::Jpeg)
    } else if ct.contains("png") {
        Some(ImageKind::Png)
    } else if ct.contains("webp") {
        Some(ImageKind::WebP)
    } else {
        None
    }
}

fn kind_from_extension(path: &str) -> Option<ImageKind> {
    match extension(path)?.as_str() {
        "jpg" | "jpeg" => Some(ImageKind::Jpeg),
        "png" => Some(ImageKind::Png),
        "webp" => Some(ImageKind::WebP),
        _ => None,
    }
}

/// Lower-cased text after the last `.` of the final path segment.
fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Case-insensitive test of `path` against a list of image extensions.
pub fn has_image_extension(path: &str, extensions: &[String]) -> bool {
    extension(path).is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}
