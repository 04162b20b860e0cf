//! The commit step for one labeling submission.
//!
//! Validate the name, serialize the record, append it to the sample log, then
//! move the image into the marked directory. The log write gates the move:
//! if the append fails nothing is moved and the submission is reported as
//! failed. Once the append succeeds the submission counts as committed, and a
//! failed move is only reported to the operator.
//!
//! Per image: `Unlabeled -> LogWritten -> Moved`. `LogWritten` without
//! `Moved` needs manual reconciliation (see [`crate::reconcile`]); nothing
//! here retries it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::{AnnotationRecord, BoundingBox, ImageName, NameError};
use crate::paths::{PathError, ResolvedPaths};
use crate::sample_log::SampleLog;

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("invalid image name: {0}")]
    InvalidName(#[from] NameError),

    #[error("image is not an unlabeled image: {0}")]
    UnknownImage(String),

    #[error("failed to append to sample log {path}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<PathError> for CommitError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidName(e) => CommitError::InvalidName(e),
            PathError::Escapes { name, .. } => CommitError::UnknownImage(name),
        }
    }
}

/// Whether the image made it into the marked directory.
#[derive(Debug)]
pub enum MoveOutcome {
    Moved(PathBuf),
    Failed(String),
}

/// Result of a committed submission. The log line is already on disk.
#[derive(Debug)]
pub struct CommitReceipt {
    pub image: ImageName,
    pub record: AnnotationRecord,
    pub moved: MoveOutcome,
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    paths: Arc<ResolvedPaths>,
    log: SampleLog,
}

impl AnnotationStore {
    /// Store writing to the sample log at `paths.output_file`.
    pub fn new(paths: Arc<ResolvedPaths>) -> Self {
        let log = SampleLog::new(paths.output_file.clone());
        Self { paths, log }
    }

    /// Build the record for `name` without touching the filesystem.
    pub fn record_for(&self, name: &ImageName, boxes: Vec<BoundingBox>) -> AnnotationRecord {
        AnnotationRecord::new(self.paths.record_path(name), boxes)
    }

    /// Commit a submission. See the module docs for the failure contract.
    pub fn commit(&self, name: &str, boxes: Vec<BoundingBox>) -> Result<CommitReceipt, CommitError> {
        let image = ImageName::parse(name)?;
        let source = self.paths.image_path(&image)?;
        if source == self.paths.output_file || !source.is_file() {
            return Err(CommitError::UnknownImage(image.to_string()));
        }

        let record = self.record_for(&image, boxes);
        self.log
            .append(&record.to_line())
            .map_err(|source| CommitError::LogWrite {
                path: self.log.path().to_path_buf(),
                source,
            })?;

        info!(image = %image, boxes = record.boxes.len(), "annotation recorded");

        let moved = self.move_to_marked(&image, &source);
        Ok(CommitReceipt {
            image,
            record,
            moved,
        })
    }

    fn move_to_marked(&self, image: &ImageName, source: &Path) -> MoveOutcome {
        let destination = match self.paths.marked_path(image) {
            Ok(p) => p,
            Err(e) => return self.move_failed(image, source, None, e.to_string()),
        };

        match move_no_clobber(source, &destination) {
            Ok(()) => MoveOutcome::Moved(destination),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.move_failed(
                image,
                source,
                Some(destination.as_path()),
                "destination already exists".to_string(),
            ),
            Err(e) => self.move_failed(image, source, Some(destination.as_path()), e.to_string()),
        }
    }

    fn move_failed(
        &self,
        image: &ImageName,
        source: &Path,
        destination: Option<&Path>,
        error: String,
    ) -> MoveOutcome {
        warn!(
            image = %image,
            source = %source.display(),
            destination = %destination.map(|d| d.display().to_string()).unwrap_or_default(),
            error = %error,
            "annotation logged but image was not moved to marked directory; reconcile manually"
        );
        MoveOutcome::Failed(error)
    }
}

/// Move `from` to `to`, failing with `AlreadyExists` instead of replacing
/// an existing `to`.
///
/// A hard link claims the destination atomically. Filesystems without hard
/// links fall back to check-then-rename.
pub(crate) fn move_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(from) {
                // keep exactly one copy
                let _ = std::fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!(from = %from.display(), error = %e, "hard link failed, renaming instead");
            if to.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                ));
            }
            std::fs::rename(from, to)
        }
    }
}
