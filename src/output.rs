//! CLI output formatting for trigger runs.
//!
//! Logs carry the detail; stdout gets a short human summary of what a run
//! did, so an operator running the binary by hand sees the result without
//! raising `RUST_LOG`.
//!
//! # Output Format
//!
//! ## On upload
//!
//! ```text
//! diary/2024-05-01/u1/20240501/1.jpg
//!     resized: 412.3 KiB at quality 75
//! ```
//!
//! ## Sweep
//!
//! ```text
//! Sweep diary/2024-04-30/ in deario.appspot.com (3 pages)
//!     processed:   12
//!     skipped:     40
//!     unsupported: 1
//!     failed:      0
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure and do no I/O.

use crate::process::Outcome;
use crate::sweep::SweepReport;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: bytes below 1 KiB, KiB below 1 MiB, MiB above.
fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

/// One-line description of an outcome, without the object path.
pub fn describe_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Processed {
            final_bytes,
            quality,
            within_budget,
        } => {
            let mut line = format!("resized: {}", format_bytes(*final_bytes));
            if let Some(q) = quality {
                line.push_str(&format!(" at quality {q}"));
            }
            match (within_budget, quality) {
                (true, _) => {}
                (false, Some(_)) => line.push_str(" (over budget at quality floor)"),
                (false, None) => line.push_str(" (over budget)"),
            }
            line
        }
        Outcome::SkippedMarked => "skipped: already resized".to_string(),
        Outcome::SkippedSmall => "skipped: small enough, marked".to_string(),
        Outcome::SkippedUnsupported { content_type } if content_type.is_empty() => {
            "skipped: unsupported format".to_string()
        }
        Outcome::SkippedUnsupported { content_type } => {
            format!("skipped: unsupported format ({content_type})")
        }
        Outcome::Conflict => "skipped: object changed during processing".to_string(),
        Outcome::OutOfScope => "ignored: outside prefix or not an image".to_string(),
        Outcome::BadTrigger(reason) => format!("ignored: {reason}"),
        Outcome::Failed(reason) => format!("failed: {reason}"),
    }
}

/// Format the result of an upload-triggered run.
pub fn format_outcome(path: Option<&str>, outcome: &Outcome) -> Vec<String> {
    match path {
        Some(path) => vec![path.to_string(), format!("{}{}", indent(1), describe_outcome(outcome))],
        None => vec![describe_outcome(outcome)],
    }
}

/// Print the result of an upload-triggered run to stdout.
pub fn print_outcome(path: Option<&str>, outcome: &Outcome) {
    for line in format_outcome(path, outcome) {
        println!("{}", line);
    }
}

/// Format a sweep summary.
pub fn format_sweep_report(report: &SweepReport) -> Vec<String> {
    let pages = match report.pages {
        1 => "1 page".to_string(),
        n => format!("{n} pages"),
    };
    let mut lines = vec![format!(
        "Sweep {} in {} ({})",
        report.prefix, report.container, pages
    )];
    let tally = &report.tally;
    for (label, count) in [
        ("processed:", tally.processed),
        ("skipped:", tally.skipped),
        ("unsupported:", tally.unsupported),
        ("failed:", tally.failed),
    ] {
        lines.push(format!("{}{:<13}{}", indent(1), label, count));
    }
    if report.ignored > 0 {
        lines.push(format!("{}{:<13}{}", indent(1), "not images:", report.ignored));
    }
    if report.timed_out {
        lines.push(format!("{}timed out before finishing", indent(1)));
    }
    lines
}

/// Print a sweep summary to stdout.
pub fn print_sweep_report(report: &SweepReport) {
    for line in format_sweep_report(report) {
        println!("{}", line);
    }
}
