//! Labeling progress overview.
//!
//! Counts unlabeled and marked images and summarizes the sample log. Used by
//! `marker stats` to check how far a labeling session has got.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::paths::ResolvedPaths;
use crate::sample_log::SampleLog;
use crate::sampler::RandomSampler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelingStats {
    pub unlabeled: usize,
    pub marked: usize,
    pub records: usize,
    pub boxes: usize,
    pub malformed: usize,
}

pub fn collect_stats(paths: &Arc<ResolvedPaths>) -> Result<LabelingStats> {
    let unlabeled = RandomSampler::new(paths.clone())
        .list_unlabeled()
        .with_context(|| format!("Failed to list {}", paths.image_root.display()))?
        .len();

    let marked = std::fs::read_dir(&paths.marked_dir)
        .with_context(|| format!("Failed to list {}", paths.marked_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .count();

    let (records, malformed) = SampleLog::new(paths.output_file.clone()).read_records()?;
    let boxes = records.iter().map(|r| r.boxes.len()).sum();

    Ok(LabelingStats {
        unlabeled,
        marked,
        records: records.len(),
        boxes,
        malformed: malformed.len(),
    })
}

/// Run the stats command and print a summary.
pub fn run_stats(paths: &Arc<ResolvedPaths>) -> Result<()> {
    let stats = collect_stats(paths)?;
    let total = stats.unlabeled + stats.marked;

    println!("Image Marker — Labeling Stats");
    println!("=============================");
    println!();
    println!("  Images:      {}", paths.image_root.display());
    println!("  Sample log:  {}", paths.output_file.display());
    println!();
    println!("  Unlabeled:   {}", stats.unlabeled);
    println!(
        "  Marked:      {} / {} ({}%)",
        stats.marked,
        total,
        if total > 0 { stats.marked * 100 / total } else { 0 }
    );
    println!("  Records:     {}", stats.records);
    println!("  Boxes:       {}", stats.boxes);
    if stats.malformed > 0 {
        println!("  Malformed:   {}", stats.malformed);
    }
    Ok(())
}
