//! Per-object pipeline and the upload-triggered processor.
//!
//! Both triggers funnel into [`process_object`], which walks one object
//! through the pipeline:
//!
//! ```text
//! read live metadata ─► classify ─► marked? ─► small? ─► download ─► normalize ─► overwrite
//!                          │           │          │
//!                          ▼           ▼          ▼
//!                     unsupported   skip     mark-only write
//! ```
//!
//! The metadata read at the start is authoritative: trigger payloads may be
//! stale. Its generation conditions every write that follows, so an object
//! that changed mid-run is left for the next delivery instead of clobbered.
//!
//! Nothing here returns an error to the caller. Every run ends in an
//! [`Outcome`], which is logged once at the level matching its severity.

use crate::classify::{Classification, classify, has_image_extension};
use crate::config::PipelineConfig;
use crate::event::Trigger;
use crate::gate::is_already_small_enough;
use crate::imaging::{CodecError, ImageCodec, NormalizeConfig, normalize};
use crate::marker::{is_marked, mark};
use crate::storage::{BlobStore, ObjectMetadata, ObjectRef, Precondition, StorageError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("image processing failed: {0}")]
    Codec(#[from] CodecError),
    #[error("timed out before {0}")]
    TimedOut(&'static str),
}

/// How one pipeline run ended. Used for logs and sweep counters only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Normalized bytes written back with the marker.
    Processed {
        final_bytes: usize,
        /// Final quality for lossy kinds.
        quality: Option<u32>,
        within_budget: bool,
    },
    /// Already carries the marker; nothing downloaded.
    SkippedMarked,
    /// Small enough; marked through a metadata-only write.
    SkippedSmall,
    /// Not a supported image kind; left untouched and unmarked.
    SkippedUnsupported { content_type: String },
    /// The generation changed between read and write.
    Conflict,
    /// Trigger path outside the prefix or without an image extension.
    OutOfScope,
    /// Trigger payload named no object.
    BadTrigger(String),
    Failed(String),
}

/// Sweep counter an outcome is tallied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Processed,
    Skipped,
    Unsupported,
    Failed,
}

impl Outcome {
    pub fn class(&self) -> OutcomeClass {
        match self {
            Outcome::Processed { .. } => OutcomeClass::Processed,
            Outcome::SkippedMarked
            | Outcome::SkippedSmall
            | Outcome::Conflict
            | Outcome::OutOfScope => OutcomeClass::Skipped,
            Outcome::SkippedUnsupported { .. } => OutcomeClass::Unsupported,
            Outcome::BadTrigger(_) | Outcome::Failed(_) => OutcomeClass::Failed,
        }
    }
}

/// Cooperative time limit for one run, checked between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`ProcessError::TimedOut`] naming the stage about to start.
    pub fn check(&self, stage: &'static str) -> Result<(), ProcessError> {
        if self.is_expired() {
            Err(ProcessError::TimedOut(stage))
        } else {
            Ok(())
        }
    }
}

/// Configuration for the per-object pipeline.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub normalize: NormalizeConfig,
    pub prefix: String,
    pub extensions: Vec<String>,
    pub default_cache_control: String,
}

impl ProcessConfig {
    /// Build a ProcessConfig from PipelineConfig values.
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            normalize: config.images.normalize_config(),
            prefix: config.storage.folder_prefix(),
            extensions: config.storage.extensions.clone(),
            default_cache_control: config.storage.default_cache_control.clone(),
        }
    }

    /// Whether a path passes the prefix and image-extension filters.
    ///
    /// `prefix` is matched as a folder, so `diary` does not admit `diary-archive/`.
    pub fn in_scope(&self, path: &str) -> bool {
        path.starts_with(&self.prefix) && has_image_extension(path, &self.extensions)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::from_pipeline_config(&PipelineConfig::default())
    }
}

/// Run the upload-triggered processor for one trigger payload.
pub fn handle_upload(
    store: &impl BlobStore,
    codec: &impl ImageCodec,
    trigger: &Trigger,
    config: &ProcessConfig,
    deadline: &Deadline,
) -> Outcome {
    let object = match trigger.target() {
        Ok(object) => object,
        Err(e) => {
            warn!(error = %e, "trigger payload skipped");
            return Outcome::BadTrigger(e.to_string());
        }
    };
    if !config.in_scope(&object.path) {
        debug!(path = %object.path, "outside prefix or not an image");
        return Outcome::OutOfScope;
    }
    process_object(store, codec, &object, config, deadline)
}

/// Run the pipeline on one object, containing every failure in the outcome.
pub fn process_object(
    store: &impl BlobStore,
    codec: &impl ImageCodec,
    object: &ObjectRef,
    config: &ProcessConfig,
    deadline: &Deadline,
) -> Outcome {
    match run_pipeline(store, codec, object, config, deadline) {
        Ok(outcome) => outcome,
        Err(ProcessError::Storage(StorageError::PreconditionFailed { expected, actual, .. })) => {
            debug!(
                path = %object.path,
                %expected,
                %actual,
                "generation changed during processing, skipping"
            );
            Outcome::Conflict
        }
        Err(e) => {
            error!(path = %object.path, error = %e, "resize failed");
            Outcome::Failed(e.to_string())
        }
    }
}

fn run_pipeline(
    store: &impl BlobStore,
    codec: &impl ImageCodec,
    object: &ObjectRef,
    config: &ProcessConfig,
    deadline: &Deadline,
) -> Result<Outcome, ProcessError> {
    deadline.check("metadata read")?;
    let meta = store.get_metadata(object)?;
    let read_generation = Precondition::IfGenerationMatches(meta.generation.clone());

    let (kind, target_content_type) = match classify(&meta.content_type, &object.path) {
        Classification::Supported { kind, content_type } => (kind, content_type),
        Classification::Unsupported { content_type } => {
            warn!(path = %object.path, content_type = %content_type, "unsupported format");
            return Ok(Outcome::SkippedUnsupported { content_type });
        }
    };

    if is_marked(&meta) {
        debug!(path = %object.path, "already resized");
        return Ok(Outcome::SkippedMarked);
    }

    if is_already_small_enough(meta.size_bytes, config.normalize.max_bytes) {
        deadline.check("mark-only write")?;
        store.set_metadata_only(object, &mark(&meta), &read_generation)?;
        debug!(path = %object.path, size_bytes = meta.size_bytes, "small enough, marked");
        return Ok(Outcome::SkippedSmall);
    }

    deadline.check("download")?;
    let bytes = store.download(object)?;

    deadline.check("re-encode")?;
    let normalized = normalize(codec, &bytes, kind, &config.normalize)?;

    deadline.check("overwrite")?;
    let written = ObjectMetadata {
        content_type: target_content_type.to_string(),
        cache_control: if meta.cache_control.is_empty() {
            config.default_cache_control.clone()
        } else {
            meta.cache_control.clone()
        },
        ..mark(&meta)
    };
    store.overwrite(object, &normalized.bytes, &written, &read_generation)?;

    info!(
        path = %object.path,
        kind = %kind,
        original_bytes = bytes.len(),
        final_bytes = normalized.bytes.len(),
        quality = normalized.quality,
        width = normalized.output.width,
        height = normalized.output.height,
        "resized"
    );
    if !normalized.within_budget {
        warn!(
            path = %object.path,
            final_bytes = normalized.bytes.len(),
            max_bytes = config.normalize.max_bytes,
            "still over budget after re-encode"
        );
    }
    Ok(Outcome::Processed {
        final_bytes: normalized.bytes.len(),
        quality: normalized.quality,
        within_budget: normalized.within_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::MockCodec;
    use crate::storage::{Generation, MemoryStore, StoreOp};
    use crate::test_helpers::{object, seed, tags};

    const BIG: usize = 2_000_000;
    const JPEG_PATH: &str = "diary/2024-05-01/u1/20240501/1.jpg";

    fn big_photo() -> MockCodec {
        MockCodec::fixed(
            Dimensions {
                width: 4000,
                height: 3000,
            },
            300_000,
        )
    }

    fn run(store: &MemoryStore, codec: &MockCodec, path: &str) -> Outcome {
        process_object(
            store,
            codec,
            &object(path),
            &ProcessConfig::default(),
            &Deadline::none(),
        )
    }

    // =========================================================================
    // Re-encode path
    // =========================================================================

    #[test]
    fn large_jpeg_is_resized_and_marked() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let read = store.metadata(&obj).unwrap();
        let codec = big_photo();

        let outcome = run(&store, &codec, JPEG_PATH);
        assert_eq!(
            outcome,
            Outcome::Processed {
                final_bytes: 300_000,
                quality: Some(75),
                within_budget: true
            }
        );

        let written = store.metadata(&obj).unwrap();
        assert!(is_marked(&written));
        assert_eq!(written.content_type, "image/jpeg");
        assert_eq!(written.cache_control, "public, max-age=31536000");
        assert_eq!(written.size_bytes, 300_000);
        assert_eq!(store.bytes(&obj).unwrap().len(), 300_000);

        // Overwrite conditioned on the generation that was read
        assert!(store.operations().contains(&StoreOp::Overwrite {
            path: JPEG_PATH.to_string(),
            size: 300_000,
            precondition: Some(read.generation),
        }));
    }

    #[test]
    fn existing_tags_and_cache_control_preserved() {
        let store = MemoryStore::new();
        let obj = object(JPEG_PATH);
        let meta = store.insert(&obj, vec![0; BIG], "image/jpeg", tags(&[("uid", "u1")]));
        store
            .set_metadata_only(
                &obj,
                &ObjectMetadata {
                    cache_control: "private, max-age=60".into(),
                    ..meta
                },
                &Precondition::None,
            )
            .unwrap();

        run(&store, &big_photo(), JPEG_PATH);

        let written = store.metadata(&obj).unwrap();
        assert_eq!(written.custom_tags.get("uid").map(String::as_str), Some("u1"));
        assert_eq!(written.custom_tags.get("resized").map(String::as_str), Some("true"));
        assert_eq!(written.cache_control, "private, max-age=60");
    }

    #[test]
    fn content_type_canonicalized_from_extension() {
        let store = MemoryStore::new();
        let obj = seed(
            &store,
            "diary/2024-05-01/u1/a.webp",
            vec![0; BIG],
            "application/octet-stream",
        );

        let outcome = run(&store, &big_photo(), "diary/2024-05-01/u1/a.webp");
        assert!(matches!(outcome, Outcome::Processed { .. }));
        assert_eq!(store.metadata(&obj).unwrap().content_type, "image/webp");
    }

    #[test]
    fn oversized_at_floor_still_written() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let codec = MockCodec::fixed(
            Dimensions {
                width: 800,
                height: 600,
            },
            900_000,
        );

        let outcome = run(&store, &codec, JPEG_PATH);
        assert_eq!(
            outcome,
            Outcome::Processed {
                final_bytes: 900_000,
                quality: Some(50),
                within_budget: false
            }
        );
        assert!(is_marked(&store.metadata(&obj).unwrap()));
    }

    #[test]
    fn unknown_size_is_downloaded() {
        let store = MemoryStore::new();
        seed(&store, JPEG_PATH, Vec::new(), "image/jpeg");

        let outcome = run(&store, &big_photo(), JPEG_PATH);
        assert!(matches!(outcome, Outcome::Processed { .. }));
        assert_eq!(store.download_count(JPEG_PATH), 1);
    }

    // =========================================================================
    // Skips
    // =========================================================================

    #[test]
    fn marked_object_is_not_touched() {
        let store = MemoryStore::new();
        let obj = object(JPEG_PATH);
        let before = store.insert(&obj, vec![0; BIG], "image/jpeg", tags(&[("resized", "true")]));
        let codec = big_photo();

        assert_eq!(run(&store, &codec, JPEG_PATH), Outcome::SkippedMarked);
        assert_eq!(store.operations(), vec![StoreOp::GetMetadata(JPEG_PATH.into())]);
        assert!(codec.get_operations().is_empty());
        assert_eq!(store.metadata(&obj).unwrap(), before);
    }

    #[test]
    fn small_object_marked_without_download() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; 614_400], "image/jpeg");
        let read = store.metadata(&obj).unwrap();
        let codec = big_photo();

        assert_eq!(run(&store, &codec, JPEG_PATH), Outcome::SkippedSmall);
        assert_eq!(store.download_count(JPEG_PATH), 0);
        assert!(codec.get_operations().is_empty());
        assert!(store.operations().contains(&StoreOp::SetMetadata {
            path: JPEG_PATH.into(),
            precondition: Some(read.generation),
        }));

        let after = store.metadata(&obj).unwrap();
        assert!(is_marked(&after));
        assert_eq!(after.content_type, "image/jpeg");
        assert_eq!(store.bytes(&obj).unwrap().len(), 614_400);
    }

    #[test]
    fn unsupported_left_unmarked() {
        let store = MemoryStore::new();
        let obj = seed(&store, "diary/2024-05-01/u1/a.gif", vec![0; BIG], "image/gif");

        let outcome = run(&store, &big_photo(), "diary/2024-05-01/u1/a.gif");
        assert_eq!(
            outcome,
            Outcome::SkippedUnsupported {
                content_type: "image/gif".into()
            }
        );
        assert_eq!(store.write_count("diary/2024-05-01/u1/a.gif"), 0);
        assert!(!is_marked(&store.metadata(&obj).unwrap()));
    }

    // =========================================================================
    // Convergence and concurrency
    // =========================================================================

    #[test]
    fn second_run_is_a_no_op() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let codec = big_photo();

        assert!(matches!(run(&store, &codec, JPEG_PATH), Outcome::Processed { .. }));
        let after_first = store.metadata(&obj).unwrap();
        store.clear_operations();

        // The overwrite re-fires the trigger for the new generation
        assert_eq!(run(&store, &codec, JPEG_PATH), Outcome::SkippedMarked);
        assert_eq!(store.download_count(JPEG_PATH), 0);
        assert_eq!(store.write_count(JPEG_PATH), 0);
        assert_eq!(store.metadata(&obj).unwrap(), after_first);
    }

    #[test]
    fn concurrent_write_yields_conflict() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![7; BIG], "image/jpeg");
        store.race_after_download(JPEG_PATH);

        assert_eq!(run(&store, &big_photo(), JPEG_PATH), Outcome::Conflict);
        assert_eq!(store.bytes(&obj).unwrap(), vec![7; BIG]);
        assert!(!is_marked(&store.metadata(&obj).unwrap()));
    }

    #[test]
    fn conflict_on_mark_only_write() {
        struct Racing(MemoryStore);
        impl BlobStore for Racing {
            fn get_metadata(&self, o: &ObjectRef) -> crate::storage::StorageResult<ObjectMetadata> {
                let mut meta = self.0.get_metadata(o)?;
                meta.generation = Generation::new("stale");
                Ok(meta)
            }
            fn download(&self, o: &ObjectRef) -> crate::storage::StorageResult<Vec<u8>> {
                self.0.download(o)
            }
            fn overwrite(
                &self,
                o: &ObjectRef,
                b: &[u8],
                m: &ObjectMetadata,
                p: &Precondition,
            ) -> crate::storage::StorageResult<ObjectMetadata> {
                self.0.overwrite(o, b, m, p)
            }
            fn set_metadata_only(
                &self,
                o: &ObjectRef,
                m: &ObjectMetadata,
                p: &Precondition,
            ) -> crate::storage::StorageResult<ObjectMetadata> {
                self.0.set_metadata_only(o, m, p)
            }
            fn list(
                &self,
                c: &str,
                prefix: &str,
                t: Option<&str>,
            ) -> crate::storage::StorageResult<crate::storage::ListPage> {
                self.0.list(c, prefix, t)
            }
        }

        let store = Racing(MemoryStore::new());
        let obj = seed(&store.0, JPEG_PATH, vec![0; 1_000], "image/jpeg");
        let outcome = process_object(
            &store,
            &big_photo(),
            &obj,
            &ProcessConfig::default(),
            &Deadline::none(),
        );
        assert_eq!(outcome, Outcome::Conflict);
        assert!(!is_marked(&store.0.metadata(&obj).unwrap()));
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn decode_failure_leaves_object_untouched() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![1; BIG], "image/jpeg");

        let outcome = run(&store, &MockCodec::failing(), JPEG_PATH);
        assert!(matches!(&outcome, Outcome::Failed(msg) if msg.contains("decode")));
        assert_eq!(store.write_count(JPEG_PATH), 0);
        assert!(!is_marked(&store.metadata(&obj).unwrap()));
    }

    #[test]
    fn missing_object_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            run(&store, &big_photo(), JPEG_PATH),
            Outcome::Failed(_)
        ));
    }

    #[test]
    fn expired_deadline_fails_before_any_call() {
        let store = MemoryStore::new();
        seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        store.clear_operations();

        let outcome = process_object(
            &store,
            &big_photo(),
            &object(JPEG_PATH),
            &ProcessConfig::default(),
            &Deadline::after(Duration::ZERO),
        );
        assert!(matches!(&outcome, Outcome::Failed(msg) if msg.contains("timed out")));
        assert!(store.operations().is_empty());
    }

    #[test]
    fn deadline_none_never_expires() {
        assert!(!Deadline::none().is_expired());
        assert!(Deadline::after(Duration::from_secs(3600)).check("x").is_ok());
    }

    // =========================================================================
    // Upload trigger
    // =========================================================================

    fn trigger(json: &str) -> Trigger {
        Trigger::from_json(json).unwrap()
    }

    fn upload(store: &MemoryStore, codec: &MockCodec, t: &Trigger) -> Outcome {
        handle_upload(store, codec, t, &ProcessConfig::default(), &Deadline::none())
    }

    #[test]
    fn upload_event_processes_object() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let t = trigger(&format!(
            r#"{{"eventKind": "object-created", "container": "{}", "path": "{JPEG_PATH}", "size": 2000000}}"#,
            obj.container
        ));

        assert!(matches!(upload(&store, &big_photo(), &t), Outcome::Processed { .. }));
        assert!(is_marked(&store.metadata(&obj).unwrap()));
    }

    #[test]
    fn upload_payload_tags_are_not_trusted() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let t = trigger(&format!(
            r#"{{"container": "{}", "path": "{JPEG_PATH}", "customTags": {{"resized": "true"}}}}"#,
            obj.container
        ));

        assert!(matches!(upload(&store, &big_photo(), &t), Outcome::Processed { .. }));
    }

    #[test]
    fn audit_log_trigger_processes_object() {
        let store = MemoryStore::new();
        let obj = seed(&store, JPEG_PATH, vec![0; BIG], "image/jpeg");
        let t = trigger(&format!(
            r#"{{"protoPayload": {{"resourceName": "projects/_/buckets/{}/objects/{}"}}}}"#,
            obj.container,
            urlencoding::encode(JPEG_PATH)
        ));

        assert!(matches!(upload(&store, &big_photo(), &t), Outcome::Processed { .. }));
    }

    #[test]
    fn upload_outside_prefix_is_ignored() {
        let store = MemoryStore::new();
        let obj = seed(&store, "avatars/u1.jpg", vec![0; BIG], "image/jpeg");
        let t = trigger(&format!(
            r#"{{"container": "{}", "path": "avatars/u1.jpg"}}"#,
            obj.container
        ));

        assert_eq!(upload(&store, &big_photo(), &t), Outcome::OutOfScope);
        assert!(store.operations().is_empty());
    }

    #[test]
    fn upload_without_image_extension_is_ignored() {
        let store = MemoryStore::new();
        let t = trigger(r#"{"container": "b", "path": "diary/2024-05-01/u1/notes.txt"}"#);
        assert_eq!(upload(&store, &big_photo(), &t), Outcome::OutOfScope);
        assert!(store.operations().is_empty());
    }

    #[test]
    fn upload_extension_check_is_case_insensitive() {
        let config = ProcessConfig::default();
        assert!(config.in_scope("diary/a/B.JPG"));
        assert!(config.in_scope("diary/a/b.Jpeg"));
        assert!(!config.in_scope("Diary/a/b.jpg"));
    }

    #[test]
    fn prefix_without_slash_matches_folder_only() {
        let mut pipeline = PipelineConfig::default();
        pipeline.storage.prefix = "diary".into();
        let config = ProcessConfig::from_pipeline_config(&pipeline);

        assert_eq!(config.prefix, "diary/");
        assert!(config.in_scope("diary/2024-05-01/u1/a.jpg"));
        assert!(!config.in_scope("diary-archive/a.jpg"));
        assert!(!config.in_scope("diary.jpg"));
    }

    #[test]
    fn upload_to_sibling_folder_is_ignored() {
        let store = MemoryStore::new();
        seed(&store, "diary-archive/u1.jpg", vec![0; BIG], "image/jpeg");
        let mut pipeline = PipelineConfig::default();
        pipeline.storage.prefix = "diary".into();
        let t = trigger(r#"{"container": "deario-test.appspot.com", "path": "diary-archive/u1.jpg"}"#);

        let outcome = handle_upload(
            &store,
            &big_photo(),
            &t,
            &ProcessConfig::from_pipeline_config(&pipeline),
            &Deadline::none(),
        );
        assert_eq!(outcome, Outcome::OutOfScope);
        assert!(store.operations().is_empty());
    }

    #[test]
    fn upload_without_path_mutates_nothing() {
        let store = MemoryStore::new();
        let t = trigger(r#"{"eventKind": "object-created", "container": "b"}"#);
        assert!(matches!(upload(&store, &big_photo(), &t), Outcome::BadTrigger(_)));
        assert!(store.operations().is_empty());
    }

    #[test]
    fn outcome_classes() {
        assert_eq!(Outcome::SkippedMarked.class(), OutcomeClass::Skipped);
        assert_eq!(Outcome::SkippedSmall.class(), OutcomeClass::Skipped);
        assert_eq!(Outcome::Conflict.class(), OutcomeClass::Skipped);
        assert_eq!(
            Outcome::SkippedUnsupported {
                content_type: String::new()
            }
            .class(),
            OutcomeClass::Unsupported
        );
        assert_eq!(Outcome::Failed("x".into()).class(), OutcomeClass::Failed);
    }
}
