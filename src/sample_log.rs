//! Append-only sample log.
//!
//! One line per labeling submission, see [`AnnotationRecord::to_line`]. The
//! file is opened in append mode for every record and closed again; no handle
//! is held between requests. Each record goes out in a single `write` call so
//! concurrent submissions never interleave inside a line.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::{AnnotationRecord, RecordParseError};

#[derive(Debug, Clone)]
pub struct SampleLog {
    path: PathBuf,
}

/// A log line that could not be parsed back into a record.
#[derive(Debug)]
pub struct MalformedLine {
    pub line_number: usize,
    pub error: RecordParseError,
}

impl SampleLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one newline-terminated line, creating the file if needed.
    pub fn append(&self, line: &str) -> std::io::Result<()> {
        debug_assert!(line.ends_with('\n'));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let written = file.write(line.as_bytes())?;
        if written != line.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, line.len()),
            ));
        }
        Ok(())
    }

    /// Read every record in the log. A missing file is an empty log.
    /// Lines that fail to parse are returned separately with their
    /// 1-based line number.
    pub fn read_records(&self) -> Result<(Vec<AnnotationRecord>, Vec<MalformedLine>)> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), Vec::new()))
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open sample log: {}", self.path.display()))
            }
        };

        let mut records = Vec::new();
        let mut malformed = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read sample log: {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match AnnotationRecord::parse_line(&line) {
                Ok(record) => records.push(record),
                Err(error) => malformed.push(MalformedLine {
                    line_number: idx + 1,
                    error,
                }),
            }
        }
        Ok((records, malformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use tempfile::TempDir;

    #[test]
    fn test_append_creates_file() {
        let tmp = TempDir::new().unwrap();
        let log = SampleLog::new(tmp.path().join("samples.txt"));
        log.append("marked/a.png 0\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(log.path()).unwrap(),
            "marked/a.png 0\n"
        );
    }

    #[test]
    fn test_append_is_append_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("samples.txt");
        std::fs::write(&path, "existing 0\n").unwrap();

        let log = SampleLog::new(&path);
        log.append("marked/a.png 0\n").unwrap();
        log.append("marked/b.png 1 1 2 3 4\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "existing 0\nmarked/a.png 0\nmarked/b.png 1 1 2 3 4\n"
        );
    }

    #[test]
    fn test_append_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let log = SampleLog::new(tmp.path().join("out/nested/samples.txt"));
        log.append("x 0\n").unwrap();
        assert!(log.path().exists());
    }

    #[test]
    fn test_append_fails_when_path_is_directory() {
        let tmp = TempDir::new().unwrap();
        let log = SampleLog::new(tmp.path());
        assert!(log.append("x 0\n").is_err());
    }

    #[test]
    fn test_concurrent_appends_keep_lines_whole() {
        let tmp = TempDir::new().unwrap();
        let log = SampleLog::new(tmp.path().join("samples.txt"));

        std::thread::scope(|s| {
            for t in 0..8 {
                let log = &log;
                s.spawn(move || {
                    for i in 0..50 {
                        let record = AnnotationRecord::new(
                            format!("marked/t{}_{}.png", t, i),
                            vec![BoundingBox {
                                x: t,
                                y: i,
                                width: 100,
                                height: 200,
                            }],
                        );
                        log.append(&record.to_line()).unwrap();
                    }
                });
            }
        });

        let (records, malformed) = log.read_records().unwrap();
        assert!(malformed.is_empty());
        assert_eq!(records.len(), 400);
    }

    #[test]
    fn test_read_records_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let log = SampleLog::new(tmp.path().join("none.txt"));
        let (records, malformed) = log.read_records().unwrap();
        assert!(records.is_empty());
        assert!(malformed.is_empty());
    }

    #[test]
    fn test_read_records_reports_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("samples.txt");
        std::fs::write(&path, "marked/a.png 1 1 2 3 4\nbroken\n\nmarked/b.png 0\n").unwrap();

        let (records, malformed) = SampleLog::new(&path).read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].line_number, 2);
    }

    #[test]
    fn test_read_records_reports_overflowing_count() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("samples.txt");
        std::fs::write(
            &path,
            "marked/a.png 0\nmarked/b.png 4611686018427387904\n",
        )
        .unwrap();

        let (records, malformed) = SampleLog::new(&path).read_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].line_number, 2);
    }
}
