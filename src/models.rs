//! Core data models used throughout the marker.
//!
//! These types represent the image names, boxes, and log records that flow
//! through the labeling loop: an [`ImageName`] is sampled, the browser sends
//! back [`BoundingBox`]es for it, and the pair is persisted as one
//! [`AnnotationRecord`] line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the subdirectory of the image root that holds labeled images.
pub const MARKED_DIR_NAME: &str = "marked";

/// Names that cannot be images: the marked directory, and `random`, whose
/// URL is taken by `GET /images/random`.
const RESERVED_NAMES: [&str; 2] = [MARKED_DIR_NAME, "random"];

/// Rejection reasons for an image name supplied by a client or found on disk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("image name must not be empty")]
    Empty,
    #[error("image name must be a single file name: {0:?}")]
    NotAFileName(String),
    #[error("image name contains whitespace or control characters: {0:?}")]
    BadCharacters(String),
    #[error("image name is reserved: {0:?}")]
    Reserved(String),
}

/// A validated file name of an image directly under the image root.
///
/// Only single path components are accepted, so a name can never escape the
/// root it is joined onto. Whitespace is rejected because the sample log is
/// space- and newline-delimited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageName(String);

impl ImageName {
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        if raw.is_empty() {
            return Err(NameError::Empty);
        }
        if raw == "." || raw == ".." || raw.contains('/') || raw.contains('\\') {
            return Err(NameError::NotAFileName(raw.to_string()));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(NameError::BadCharacters(raw.to_string()));
        }
        if RESERVED_NAMES.contains(&raw) {
            return Err(NameError::Reserved(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One box drawn on an image, in source-image pixel coordinates.
///
/// Values are passed through as received; negative or zero-sized boxes are
/// recorded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Failure to read an [`AnnotationRecord`] back from a log line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordParseError {
    #[error("line is empty")]
    Empty,
    #[error("missing box count")]
    MissingCount,
    #[error("invalid integer field {0:?}")]
    BadInteger(String),
    #[error("box count {count} does not match {fields} coordinate fields")]
    CountMismatch { count: usize, fields: usize },
}

/// One labeling submission as it appears in the sample log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    /// Path of the labeled image relative to the log file's directory.
    pub path: String,
    pub boxes: Vec<BoundingBox>,
}

impl AnnotationRecord {
    pub fn new(path: impl Into<String>, boxes: Vec<BoundingBox>) -> Self {
        Self {
            path: path.into(),
            boxes,
        }
    }

    /// Serialize as `<path> <count> <x> <y> <w> <h> ...\n`.
    pub fn to_line(&self) -> String {
        let mut line = format!("{} {}", self.path, self.boxes.len());
        for b in &self.boxes {
            line.push_str(&format!(" {} {} {} {}", b.x, b.y, b.width, b.height));
        }
        line.push('\n');
        line
    }

    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let mut fields = line.split_whitespace();
        let path = fields.next().ok_or(RecordParseError::Empty)?;
        let count_field = fields.next().ok_or(RecordParseError::MissingCount)?;
        let count: usize = count_field
            .parse()
            .map_err(|_| RecordParseError::BadInteger(count_field.to_string()))?;

        let coords = fields
            .map(|f| {
                f.parse::<i64>()
                    .map_err(|_| RecordParseError::BadInteger(f.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // a corrupted count must not overflow
        if count.checked_mul(4) != Some(coords.len()) {
            return Err(RecordParseError::CountMismatch {
                count,
                fields: coords.len(),
            });
        }

        let boxes = coords
            .chunks_exact(4)
            .map(|c| BoundingBox {
                x: c[0],
                y: c[1],
                width: c[2],
                height: c[3],
            })
            .collect();

        Ok(Self::new(path, boxes))
    }
}
