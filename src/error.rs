//! Startup failures and their process exit codes.
//!
//! Everything that can go wrong before the server accepts its first
//! connection is fatal. Each case maps to its own exit status so wrapper
//! scripts can tell them apart. Usage errors are reported by clap with
//! status 2.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("image directory does not exist: {path}")]
    ImageRootMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image path is not a directory: {0}")]
    ImageRootNotDirectory(PathBuf),

    #[error("failed to create directory for marked images {path}")]
    MarkedDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve path {path}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no relative path from {from} to {to}")]
    NoRelativePath { from: PathBuf, to: PathBuf },

    #[error("path cannot be written to the sample log (whitespace or non-UTF-8): {0:?}")]
    UnrecordablePath(String),

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::ImageRootMissing { .. } | StartupError::ImageRootNotDirectory(_) => 3,
            StartupError::MarkedDirCreate { .. } => 4,
            StartupError::Bind { .. } => 5,
            StartupError::Config(_)
            | StartupError::Resolve { .. }
            | StartupError::NoRelativePath { .. }
            | StartupError::UnrecordablePath(_) => 6,
        }
    }
}
