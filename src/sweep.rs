//! Daily sweep over the previous day's upload folder.
//!
//! Catches objects the upload trigger missed. The sweep lists
//! `<prefix><yesterday>/` page by page, keeps paths with an image extension,
//! and runs [`process_object`] over each page on a dedicated rayon pool
//! sized to `sweep.concurrency`. Pages are fetched one after another; only
//! objects within a page run concurrently.
//!
//! Per-object outcomes are folded into a [`SweepTally`] per worker and
//! reduced at the end of each page. One summary line is logged when the
//! sweep finishes.

use crate::classify::has_image_extension;
use crate::config::PipelineConfig;
use crate::imaging::ImageCodec;
use crate::process::{Deadline, Outcome, OutcomeClass, ProcessConfig, process_object};
use crate::storage::{BlobStore, StorageError};
use chrono::NaiveDate;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("listing failed: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Prefix of the folder uploaded to on the day before `today`.
///
/// ```
/// use chrono::NaiveDate;
/// use deario_images::sweep::sweep_prefix;
///
/// let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// assert_eq!(sweep_prefix("diary/", today), "diary/2024-02-29/");
/// ```
pub fn sweep_prefix(prefix: &str, today: NaiveDate) -> String {
    let day = today.pred_opt().unwrap_or(today);
    format!(
        "{}/{}/",
        prefix.trim_end_matches('/'),
        day.format("%Y-%m-%d")
    )
}

/// Per-run outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepTally {
    pub processed: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub failed: usize,
}

impl SweepTally {
    pub fn of(outcome: &Outcome) -> Self {
        let mut tally = Self::default();
        tally.record(outcome);
        tally
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.class() {
            OutcomeClass::Processed => self.processed += 1,
            OutcomeClass::Skipped => self.skipped += 1,
            OutcomeClass::Unsupported => self.unsupported += 1,
            OutcomeClass::Failed => self.failed += 1,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            unsupported: self.unsupported + other.unsupported,
            failed: self.failed + other.failed,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.unsupported + self.failed
    }
}

/// Summary of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub container: String,
    pub prefix: String,
    pub pages: usize,
    /// Listed objects without an image extension.
    pub ignored: usize,
    pub tally: SweepTally,
    /// The sweep stopped early; unstarted objects are not counted.
    pub timed_out: bool,
}

/// Run the sweep for the day before `today`.
///
/// Only a listing failure ends the sweep with an error. Object failures are
/// counted and the sweep moves on.
pub fn run_sweep(
    store: &impl BlobStore,
    codec: &impl ImageCodec,
    container: &str,
    today: NaiveDate,
    config: &PipelineConfig,
) -> Result<SweepReport, SweepError> {
    let process_config = ProcessConfig::from_pipeline_config(config);
    let prefix = sweep_prefix(&config.storage.folder_prefix(), today);
    let deadline = Deadline::after(config.sweep.timeout());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.sweep.concurrency)
        .build()?;

    info!(container, prefix = %prefix, concurrency = config.sweep.concurrency, "sweep started");

    let mut report = SweepReport {
        container: container.to_string(),
        prefix: prefix.clone(),
        pages: 0,
        ignored: 0,
        tally: SweepTally::default(),
        timed_out: false,
    };
    let mut page_token: Option<String> = None;

    loop {
        if deadline.is_expired() {
            report.timed_out = true;
            break;
        }
        let page = store.list(container, &prefix, page_token.as_deref())?;
        report.pages += 1;

        let (images, others): (Vec<_>, Vec<_>) = page
            .objects
            .iter()
            .partition(|o| has_image_extension(&o.path, &process_config.extensions));
        report.ignored += others.len();
        debug!(page = report.pages, images = images.len(), "sweeping page");

        let page_tally = pool.install(|| {
            images
                .par_iter()
                .filter(|_| !deadline.is_expired())
                .map(|object| {
                    SweepTally::of(&process_object(
                        store,
                        codec,
                        object,
                        &process_config,
                        &deadline,
                    ))
                })
                .reduce(SweepTally::default, SweepTally::merge)
        });
        report.tally = report.tally.merge(page_tally);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if report.timed_out || deadline.is_expired() {
        report.timed_out = true;
        warn!(prefix = %prefix, "sweep timed out");
    }
    let tally = report.tally;
    info!(
        prefix = %prefix,
        processed = tally.processed,
        skipped = tally.skipped,
        unsupported = tally.unsupported,
        failed = tally.failed,
        "sweep finished"
    );
    Ok(report)
}
