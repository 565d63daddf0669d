//! Blob store abstraction.
//!
//! The pipeline never talks to a concrete storage service. It goes through
//! [`BlobStore`], which offers exactly the five calls the pipeline needs:
//! read metadata, download, conditional overwrite, metadata-only update, and
//! paged listing.
//!
//! | Implementation | Used by |
//! |---|---|
//! | [`MemoryStore`] | tests and the pipeline docs; records every call |
//! | [`FsStore`] | the `deario-images` binary; objects on disk with JSON sidecars |
//!
//! ## Generations
//!
//! Every object carries an opaque [`Generation`] that changes on every write.
//! Writes can be conditioned on the generation the caller last read
//! ([`Precondition::IfGenerationMatches`]); a mismatch yields
//! [`StorageError::PreconditionFailed`] and leaves the object untouched.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::{MemoryStore, StoreOp};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object `{path}` not found in `{container}`")]
    NotFound { container: String, path: String },
    #[error("generation precondition failed for `{path}`: expected {expected}, found {actual}")]
    PreconditionFailed {
        path: String,
        expected: Generation,
        actual: Generation,
    },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("invalid page token `{0}`")]
    InvalidPageToken(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Identifies a blob by container (bucket) and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub container: String,
    pub path: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.path)
    }
}

/// Opaque version token. Compared for equality only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub String);

impl Generation {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of one object generation.
///
/// `size_bytes` and `generation` are owned by the store: writes ignore the
/// values passed in and report the stored ones in the returned metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub content_type: String,
    /// Zero or negative means unknown.
    pub size_bytes: i64,
    pub generation: Generation,
    pub custom_tags: BTreeMap<String, String>,
    pub cache_control: String,
}

/// Condition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    None,
    IfGenerationMatches(Generation),
}

impl Precondition {
    /// Check `current` against this precondition.
    pub fn check(&self, path: &str, current: &Generation) -> StorageResult<()> {
        match self {
            Precondition::None => Ok(()),
            Precondition::IfGenerationMatches(expected) if expected == current => Ok(()),
            Precondition::IfGenerationMatches(expected) => Err(StorageError::PreconditionFailed {
                path: path.to_string(),
                expected: expected.clone(),
                actual: current.clone(),
            }),
        }
    }
}

/// One page of a listing plus the token for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectRef>,
    pub next_page_token: Option<String>,
}

/// Storage operations the pipeline depends on.
///
/// `Sync` so a single store can be shared across rayon workers.
pub trait BlobStore: Sync {
    /// Read the live metadata of an object.
    fn get_metadata(&self, object: &ObjectRef) -> StorageResult<ObjectMetadata>;

    /// Download the current bytes of an object.
    fn download(&self, object: &ObjectRef) -> StorageResult<Vec<u8>>;

    /// Replace bytes and metadata in one write, creating a new generation.
    fn overwrite(
        &self,
        object: &ObjectRef,
        bytes: &[u8],
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata>;

    /// Replace content type, cache-control and custom tags without touching bytes.
    fn set_metadata_only(
        &self,
        object: &ObjectRef,
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata>;

    /// List objects under `prefix`, one page at a time, in path order.
    fn list(
        &self,
        container: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> StorageResult<ListPage>;
}

/// Reject keys that could escape a container directory.
pub(crate) fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == "..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\')
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

const PAGE_TOKEN_PREFIX: &str = "after:";

/// Cut one page out of a sorted list of paths.
///
/// Page tokens encode the last path returned, so a listing stays consistent
/// when objects are overwritten between pages.
pub(crate) fn paginate(
    container: &str,
    sorted_paths: Vec<String>,
    page_token: Option<&str>,
    page_size: usize,
) -> StorageResult<ListPage> {
    let after = match page_token {
        None => None,
        Some(token) => Some(
            token
                .strip_prefix(PAGE_TOKEN_PREFIX)
                .ok_or_else(|| StorageError::InvalidPageToken(token.to_string()))?,
        ),
    };
    let page_size = page_size.max(1);
    let mut remaining = sorted_paths
        .into_iter()
        .filter(|path| after.is_none_or(|after| path.as_str() > after));
    let objects: Vec<ObjectRef> = remaining
        .by_ref()
        .take(page_size)
        .map(|path| ObjectRef::new(container, path))
        .collect();
    let next_page_token = match (remaining.next(), objects.last()) {
        (Some(_), Some(last)) => Some(format!("{PAGE_TOKEN_PREFIX}{}", last.path)),
        _ => None,
    };
    Ok(ListPage {
        objects,
        next_page_token,
    })
}
