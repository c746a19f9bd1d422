//! Error types for diffloclib

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while analyzing a tree
#[derive(Error, Debug)]
pub enum DifflocError {
    /// Failed to open or read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A read failed after some lines were already counted
    #[error("read of '{path}' failed after {lines} lines: {source}")]
    PartialRead {
        path: PathBuf,
        lines: u64,
        source: std::io::Error,
    },

    /// Path does not exist or is not a directory
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository could not be opened or read
    #[error("git error: {0}")]
    GitError(String),

    /// The run was stopped by the caller's cancellation token
    #[error("analysis canceled")]
    Canceled,
}

impl DifflocError {
    /// Whether this is the cancellation outcome rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, DifflocError::Canceled)
    }

    /// Lines counted before a read failure, if the error carries a partial result.
    pub fn partial_lines(&self) -> Option<u64> {
        match self {
            DifflocError::PartialRead { lines, .. } => Some(*lines),
            _ => None,
        }
    }
}
