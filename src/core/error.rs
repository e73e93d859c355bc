//! Error types for the index engine
//!
//! Structural problems with an index file are grouped under [`FormatError`] so
//! callers can tell "this file is corrupt" apart from ordinary I/O trouble and
//! from a cancelled operation.

use std::path::PathBuf;
use thiserror::Error;

/// A structural problem found while reading a CAF index stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// Magic word is not congruent to the CAF magic base
    #[error("Not a CAF index (bad magic number {0})")]
    BadMagic(u32),

    /// Version is newer than this reader understands, or negative
    #[error("Unsupported CAF format version {0}")]
    UnsupportedVersion(i32),

    /// The stream ended in the middle of a field
    #[error("Index file is truncated")]
    Truncated,

    /// A count or field holds a value no valid writer produces
    #[error("Corrupt index: {0}")]
    Corrupt(String),
}

/// Main error type for indexing, loading and matching
#[derive(Error, Debug)]
pub enum IndexError {
    /// The index file is not a readable CAF stream
    #[error("Invalid index file: {0}")]
    Format(#[from] FormatError),

    /// General I/O error
    #[error("IO error: {0}")]
    IoError(String),

    /// A folder argument does not point at a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A search pattern failed to compile
    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Composed indexes span several roots and have no single tree to write
    #[error("Index has no root directory and cannot be saved")]
    MissingRoot,

    /// A background worker stopped without delivering a result
    #[error("Worker thread failed: {0}")]
    WorkerFailed(String),

    /// The operation observed its cancellation flag and stopped
    #[error("Operation cancelled")]
    Cancelled,
}

impl IndexError {
    /// True when the error means the index file itself is unusable
    pub fn is_format_error(&self) -> bool {
        matches!(self, IndexError::Format(_))
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, IndexError>;

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return IndexError::Format(FormatError::Truncated);
        }
        IndexError::IoError(err.to_string())
    }
}
