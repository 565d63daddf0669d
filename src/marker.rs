//! The `resized = "true"` idempotency marker.
//!
//! Once an object carries the marker, no processor re-downloads or
//! re-encodes it. The marker must ride on the write that finalizes the
//! object: the content overwrite on the re-encode path, or a metadata-only
//! update on the size-gate path.

use crate::storage::ObjectMetadata;

pub const MARKER_KEY: &str = "resized";
pub const MARKER_VALUE: &str = "true";

/// True when the metadata carries the marker with exactly `"true"`.
pub fn is_marked(metadata: &ObjectMetadata) -> bool {
    metadata
        .custom_tags
        .get(MARKER_KEY)
        .is_some_and(|v| v == MARKER_VALUE)
}

/// Copy of `metadata` with the marker set; other tags are kept.
pub fn mark(metadata: &ObjectMetadata) -> ObjectMetadata {
    let mut marked = metadata.clone();
    marked
        .custom_tags
        .insert(MARKER_KEY.to_string(), MARKER_VALUE.to_string());
    marked
}
