//! In-memory [`BlobStore`] that records every call.
//!
//! Uses `Mutex` (not `RefCell`) so it is `Sync` and works with rayon's
//! `par_iter` in the sweep.

use super::{
    BlobStore, Generation, ListPage, ObjectMetadata, ObjectRef, Precondition, StorageError,
    StorageResult, ensure_key_safe, paginate,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A call made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    GetMetadata(String),
    Download(String),
    Overwrite {
        path: String,
        size: usize,
        precondition: Option<Generation>,
    },
    SetMetadata {
        path: String,
        precondition: Option<Generation>,
    },
    List {
        prefix: String,
        page_token: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    metadata: ObjectMetadata,
}

/// Blob store held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectRef, StoredObject>>,
    operations: Mutex<Vec<StoreOp>>,
    /// Paths whose generation is bumped right after a download, simulating
    /// a concurrent writer.
    race_after_download: Mutex<BTreeSet<String>>,
    next_generation: AtomicU64,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            operations: Mutex::new(Vec::new()),
            race_after_download: Mutex::new(BTreeSet::new()),
            next_generation: AtomicU64::new(1),
            page_size: 1000,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn bump_generation(&self) -> Generation {
        Generation(self.next_generation.fetch_add(1, Ordering::SeqCst).to_string())
    }

    /// Store an object as an uploader would: fresh generation, given tags.
    pub fn insert(
        &self,
        object: &ObjectRef,
        bytes: Vec<u8>,
        content_type: &str,
        custom_tags: BTreeMap<String, String>,
    ) -> ObjectMetadata {
        let metadata = ObjectMetadata {
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as i64,
            generation: self.bump_generation(),
            custom_tags,
            cache_control: String::new(),
        };
        self.objects.lock().unwrap().insert(
            object.clone(),
            StoredObject {
                bytes,
                metadata: metadata.clone(),
            },
        );
        metadata
    }

    /// Make the next download of `path` look like it raced another writer.
    pub fn race_after_download(&self, path: &str) {
        self.race_after_download
            .lock()
            .unwrap()
            .insert(path.to_string());
    }

    /// Current bytes, bypassing the operation log.
    pub fn bytes(&self, object: &ObjectRef) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(object)
            .map(|o| o.bytes.clone())
    }

    /// Current metadata, bypassing the operation log.
    pub fn metadata(&self, object: &ObjectRef) -> Option<ObjectMetadata> {
        self.objects
            .lock()
            .unwrap()
            .get(object)
            .map(|o| o.metadata.clone())
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().unwrap().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().unwrap().clear();
    }

    /// Number of downloads recorded for `path`.
    pub fn download_count(&self, path: &str) -> usize {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, StoreOp::Download(p) if p == path))
            .count()
    }

    /// Number of writes (overwrite or metadata-only) recorded for `path`.
    pub fn write_count(&self, path: &str) -> usize {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| match op {
                StoreOp::Overwrite { path: p, .. } | StoreOp::SetMetadata { path: p, .. } => {
                    p == path
                }
                _ => false,
            })
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().unwrap().push(op);
    }

    fn not_found(object: &ObjectRef) -> StorageError {
        StorageError::NotFound {
            container: object.container.clone(),
            path: object.path.clone(),
        }
    }
}

fn expected_generation(precondition: &Precondition) -> Option<Generation> {
    match precondition {
        Precondition::None => None,
        Precondition::IfGenerationMatches(g) => Some(g.clone()),
    }
}

impl BlobStore for MemoryStore {
    fn get_metadata(&self, object: &ObjectRef) -> StorageResult<ObjectMetadata> {
        self.record(StoreOp::GetMetadata(object.path.clone()));
        self.metadata(object).ok_or_else(|| Self::not_found(object))
    }

    fn download(&self, object: &ObjectRef) -> StorageResult<Vec<u8>> {
        self.record(StoreOp::Download(object.path.clone()));
        let bytes = self.bytes(object).ok_or_else(|| Self::not_found(object))?;

        if self.race_after_download.lock().unwrap().remove(&object.path) {
            let generation = self.bump_generation();
            if let Some(stored) = self.objects.lock().unwrap().get_mut(object) {
                stored.metadata.generation = generation;
            }
        }
        Ok(bytes)
    }

    fn overwrite(
        &self,
        object: &ObjectRef,
        bytes: &[u8],
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata> {
        ensure_key_safe(&object.path)?;
        self.record(StoreOp::Overwrite {
            path: object.path.clone(),
            size: bytes.len(),
            precondition: expected_generation(precondition),
        });

        let mut objects = self.objects.lock().unwrap();
        if let Some(current) = objects.get(object) {
            precondition.check(&object.path, &current.metadata.generation)?;
        } else if precondition != &Precondition::None {
            return Err(Self::not_found(object));
        }

        let stored = ObjectMetadata {
            size_bytes: bytes.len() as i64,
            generation: self.bump_generation(),
            ..metadata.clone()
        };
        objects.insert(
            object.clone(),
            StoredObject {
                bytes: bytes.to_vec(),
                metadata: stored.clone(),
            },
        );
        Ok(stored)
    }

    fn set_metadata_only(
        &self,
        object: &ObjectRef,
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata> {
        self.record(StoreOp::SetMetadata {
            path: object.path.clone(),
            precondition: expected_generation(precondition),
        });

        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get_mut(object)
            .ok_or_else(|| Self::not_found(object))?;
        precondition.check(&object.path, &current.metadata.generation)?;

        current.metadata = ObjectMetadata {
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
            custom_tags: metadata.custom_tags.clone(),
            size_bytes: current.metadata.size_bytes,
            generation: self.bump_generation(),
        };
        Ok(current.metadata.clone())
    }

    fn list(
        &self,
        container: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
            page_token: page_token.map(str::to_string),
        });
        let paths: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|o| o.container == container && o.path.starts_with(prefix))
            .map(|o| o.path.clone())
            .collect();
        paginate(container, paths, page_token, self.page_size)
    }
}
