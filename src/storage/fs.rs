//! Directory-backed [`BlobStore`].
//!
//! ```text
//! <root>/
//! └── <container>/
//!     ├── diary/2024-05-01/u1/20240501/1.jpg          # object bytes
//!     └── .meta/diary/2024-05-01/u1/20240501/1.jpg.json # sidecar metadata
//! ```
//!
//! The sidecar holds content type, cache-control, custom tags and a numeric
//! generation. An object without a sidecar (dropped in by hand) reads as
//! generation `0` with empty metadata. Bytes are written to a temporary file
//! and renamed into place; the sidecar follows. A process-wide lock makes
//! the generation check and the write a single step for callers sharing one
//! `FsStore`.

use super::{
    BlobStore, Generation, ListPage, ObjectMetadata, ObjectRef, Precondition, StorageError,
    StorageResult, ensure_key_safe, paginate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use walkdir::WalkDir;

const META_DIR: &str = ".meta";
const TMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Sidecar {
    generation: u64,
    content_type: String,
    cache_control: String,
    custom_tags: BTreeMap<String, String>,
}

/// Blob store rooted at a local directory; one sub-directory per container.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    page_size: usize,
    write_lock: Mutex<()>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: 1000,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_root(&self, container: &str) -> StorageResult<PathBuf> {
        if container.is_empty()
            || container == META_DIR
            || container.contains(['/', '\\'])
            || container == ".."
        {
            return Err(StorageError::InvalidKey(container.to_string()));
        }
        Ok(self.root.join(container))
    }

    fn object_path(&self, object: &ObjectRef) -> StorageResult<PathBuf> {
        ensure_key_safe(&object.path)?;
        Ok(self.container_root(&object.container)?.join(&object.path))
    }

    fn sidecar_path(&self, object: &ObjectRef) -> StorageResult<PathBuf> {
        ensure_key_safe(&object.path)?;
        Ok(self
            .container_root(&object.container)?
            .join(META_DIR)
            .join(format!("{}.json", object.path)))
    }

    fn read_sidecar(&self, object: &ObjectRef) -> StorageResult<Sidecar> {
        let path = self.sidecar_path(object)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_sidecar(&self, object: &ObjectRef, sidecar: &Sidecar) -> StorageResult<()> {
        let path = self.sidecar_path(object)?;
        let json = serde_json::to_string_pretty(sidecar)?;
        write_atomically(&path, json.as_bytes())?;
        Ok(())
    }

    fn not_found(object: &ObjectRef) -> StorageError {
        StorageError::NotFound {
            container: object.container.clone(),
            path: object.path.clone(),
        }
    }

    /// Size on disk, or `NotFound` when the object file is missing.
    fn object_len(&self, object: &ObjectRef) -> StorageResult<u64> {
        match std::fs::metadata(self.object_path(object)?) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(Self::not_found(object)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(object)),
            Err(e) => Err(e.into()),
        }
    }

    fn to_metadata(sidecar: Sidecar, size: u64) -> ObjectMetadata {
        ObjectMetadata {
            content_type: sidecar.content_type,
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            generation: Generation(sidecar.generation.to_string()),
            custom_tags: sidecar.custom_tags,
            cache_control: sidecar.cache_control,
        }
    }

    /// Store an object as a fresh upload: new generation, no custom tags.
    pub fn put(
        &self,
        object: &ObjectRef,
        bytes: &[u8],
        content_type: &str,
    ) -> StorageResult<ObjectMetadata> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let previous = self.read_sidecar(object)?;
        write_atomically(&self.object_path(object)?, bytes)?;
        let sidecar = Sidecar {
            generation: previous.generation + 1,
            content_type: content_type.to_string(),
            ..Sidecar::default()
        };
        self.write_sidecar(object, &sidecar)?;
        Ok(Self::to_metadata(sidecar, bytes.len() as u64))
    }
}

/// Write `bytes` to a temporary sibling, then rename it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
    std::fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("object");
    let tmp_path = parent.join(format!("{TMP_PREFIX}{}-{file_name}", std::process::id()));
    if let Err(e) = std::fs::write(&tmp_path, bytes) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    std::fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })
}

impl BlobStore for FsStore {
    fn get_metadata(&self, object: &ObjectRef) -> StorageResult<ObjectMetadata> {
        let size = self.object_len(object)?;
        let sidecar = self.read_sidecar(object)?;
        Ok(Self::to_metadata(sidecar, size))
    }

    fn download(&self, object: &ObjectRef) -> StorageResult<Vec<u8>> {
        match std::fs::read(self.object_path(object)?) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(object)),
            Err(e) => Err(e.into()),
        }
    }

    fn overwrite(
        &self,
        object: &ObjectRef,
        bytes: &[u8],
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.read_sidecar(object)?;
        precondition.check(&object.path, &Generation(current.generation.to_string()))?;

        write_atomically(&self.object_path(object)?, bytes)?;
        let sidecar = Sidecar {
            generation: current.generation + 1,
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
            custom_tags: metadata.custom_tags.clone(),
        };
        self.write_sidecar(object, &sidecar)?;
        debug!(path = %object.path, generation = sidecar.generation, bytes = bytes.len(), "overwrote object");
        Ok(Self::to_metadata(sidecar, bytes.len() as u64))
    }

    fn set_metadata_only(
        &self,
        object: &ObjectRef,
        metadata: &ObjectMetadata,
        precondition: &Precondition,
    ) -> StorageResult<ObjectMetadata> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let size = self.object_len(object)?;
        let current = self.read_sidecar(object)?;
        precondition.check(&object.path, &Generation(current.generation.to_string()))?;

        let sidecar = Sidecar {
            generation: current.generation + 1,
            content_type: metadata.content_type.clone(),
            cache_control: metadata.cache_control.clone(),
            custom_tags: metadata.custom_tags.clone(),
        };
        self.write_sidecar(object, &sidecar)?;
        Ok(Self::to_metadata(sidecar, size))
    }

    fn list(
        &self,
        container: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        let container_root = self.container_root(container)?;
        if !container_root.exists() {
            return paginate(container, Vec::new(), page_token, self.page_size);
        }

        let mut paths = Vec::new();
        let walker = WalkDir::new(&container_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != META_DIR);
        for entry in walker {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(TMP_PREFIX))
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&container_root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                paths.push(key);
            }
        }
        paths.sort();
        paginate(container, paths, page_token, self.page_size)
    }
}
