//! # Deario Images
//!
//! Normalizes photos attached to Deario diary entries. Every image uploaded
//! under the diary prefix is decoded, turned upright, shrunk to a maximum
//! width and re-encoded under a byte budget, then written back over itself.
//!
//! # Architecture: One Pipeline, Two Triggers
//!
//! ```text
//! object-created event ─┐
//!                       ├─► classify → marker? → size gate → normalize → overwrite(+marker)
//! daily clock (sweep) ──┘
//! ```
//!
//! The upload trigger runs the pipeline once per created object. The daily
//! sweep lists yesterday's upload folder and runs the identical pipeline over
//! every image it finds, for objects the event path missed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`classify`] | Content-type / extension → [`classify::ImageKind`] |
//! | [`gate`] | Metadata-only "already small enough" check |
//! | [`marker`] | The `resized = "true"` idempotency tag |
//! | [`imaging`] | Decode, orient, resize, encode, byte-budget quality back-off |
//! | [`storage`] | [`storage::BlobStore`] trait plus in-memory and directory stores |
//! | [`event`] | Trigger payloads (object-created, audit-log resource names) |
//! | [`process`] | Per-object pipeline and the upload-triggered processor |
//! | [`sweep`] | Daily bounded-concurrency sweep over a date-derived prefix |
//! | [`config`] | `deario.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting for outcomes and sweep summaries |
//!
//! # Design Decisions
//!
//! ## The Marker Is the Loop Breaker
//!
//! Overwriting an object fires another object-created event for the same
//! path. The pipeline therefore attaches `resized = "true"` to the very write
//! that stores the normalized bytes, and checks for it before touching an
//! object. A second delivery reads the marker and stops without downloading.
//! Small objects get the marker through a metadata-only write so they are
//! never inspected again either.
//!
//! ## Generation-Conditioned Writes
//!
//! Every write is conditioned on the generation read at the start of the run.
//! If an upload trigger and the sweep race on the same object, one of them
//! loses the precondition and treats it as a benign skip. Nobody clobbers
//! bytes they did not inspect.
//!
//! ## Re-encode From the Decoded Original
//!
//! Quality back-off re-encodes the same decoded, rotated, resized pixels at
//! each step. Encoding the previous lossy output again would compound
//! artifacts beyond the controlled 5-point step.
//!
//! ## Failures Stay Per-Object
//!
//! No object's failure propagates beyond its own [`process::Outcome`]. The
//! sweep keeps going, the trigger logs and returns. There is no retry: a
//! retry would redo identical work, and the next sweep revisits anything
//! left unmarked anyway.

pub mod classify;
pub mod config;
pub mod event;
pub mod gate;
pub mod imaging;
pub mod marker;
pub mod output;
pub mod process;
pub mod storage;
pub mod sweep;

#[cfg(test)]
pub(crate) mod test_helpers;
