//! Per-field failures of the quicklook driver.

use std::path::PathBuf;

use crate::core::domain::{Band, RunNumber};

/// Result type for quicklook operations
pub type QuicklookResult<T> = Result<T, QuicklookError>;

/// Error type for a single quicklook job. Any of these aborts the field; the
/// batch continues.
#[derive(Debug, thiserror::Error)]
pub enum QuicklookError {
    #[error("Run {0} is not in the run index")]
    MissingRun(RunNumber),

    #[error("No {band} confidence map for directory {directory}")]
    MissingConfidenceMap { directory: String, band: Band },

    #[error("Image {0} does not exist")]
    MissingFile(PathBuf),

    #[error("Field {field} has no {band} exposure")]
    MissingBand { field: String, band: Band },

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} wrote to stderr: {stderr} (stdout: {stdout})")]
    ToolStderr {
        command: String,
        stderr: String,
        stdout: String,
    },

    #[error("FITS error on {path}: {source}")]
    Fits {
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },

    #[error("Keyword {keyword} = '{value}' contains a NUL byte")]
    InvalidKeyword { keyword: String, value: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QuicklookError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QuicklookError::Io {
            path: path.into(),
            source,
        }
    }
}
