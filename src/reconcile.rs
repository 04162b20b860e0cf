//! Offline repair for images whose record was logged but never moved.
//!
//! Run by `marker reconcile`, never from the commit path. Reads the sample
//! log, finds every recorded image that is still sitting in the image root
//! and not in the marked directory, and optionally moves it. The log itself
//! is only read.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::ImageName;
use crate::paths::ResolvedPaths;
use crate::sample_log::SampleLog;
use crate::store::move_no_clobber;

/// An image in the `LogWritten` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub image: ImageName,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub records: usize,
    pub pending: Vec<PendingMove>,
    pub moved: usize,
    /// Records whose path does not point into this marked directory.
    pub foreign: usize,
    pub malformed: usize,
}

pub fn find_pending(paths: &ResolvedPaths, log: &SampleLog) -> Result<ReconcileReport> {
    let (records, malformed) = log.read_records()?;
    for bad in &malformed {
        warn!(line = bad.line_number, error = %bad.error, "skipping malformed sample log line");
    }

    let mut report = ReconcileReport {
        records: records.len(),
        malformed: malformed.len(),
        ..Default::default()
    };

    let mut seen = BTreeSet::new();
    for record in &records {
        let Some(image) = paths.name_from_record_path(&record.path) else {
            report.foreign += 1;
            continue;
        };
        if !seen.insert(image.clone()) {
            continue;
        }

        let from = paths.image_path(&image)?;
        let to = paths.marked_path(&image)?;
        if from.is_file() && !to.exists() {
            report.pending.push(PendingMove { image, from, to });
        }
    }
    Ok(report)
}

/// Move every pending image into the marked directory.
pub fn apply(report: &mut ReconcileReport) -> Result<()> {
    for pending in &report.pending {
        move_no_clobber(&pending.from, &pending.to).with_context(|| {
            format!(
                "Failed to move {} to {}",
                pending.from.display(),
                pending.to.display()
            )
        })?;
        report.moved += 1;
    }
    Ok(())
}

/// Entry point for `marker reconcile`.
pub fn run_reconcile(paths: &ResolvedPaths, do_apply: bool) -> Result<()> {
    let log = SampleLog::new(paths.output_file.clone());
    let mut report = find_pending(paths, &log)?;

    println!("Sample log:   {}", paths.output_file.display());
    println!("Records:      {}", report.records);
    if report.malformed > 0 {
        println!("Malformed:    {}", report.malformed);
    }
    if report.foreign > 0 {
        println!("Foreign:      {} (not in {})", report.foreign, paths.marked_dir.display());
    }
    println!("Not moved:    {}", report.pending.len());
    for pending in &report.pending {
        println!("  {}", pending.image);
    }

    if do_apply {
        apply(&mut report)?;
        println!("Moved:        {}", report.moved);
    } else if !report.pending.is_empty() {
        println!();
        println!("Run again with --apply to move them into the marked directory.");
    }
    Ok(())
}
