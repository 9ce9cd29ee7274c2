//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The named file does not exist in the directory.
    #[error("file not found: {name}")]
    FileNotFound {
        /// Name of the missing file.
        name: String,
    },

    /// The named file already exists and outputs are write-once.
    #[error("file already exists: {name}")]
    FileExists {
        /// Name of the existing file.
        name: String,
    },

    /// The file name is not usable inside a directory.
    #[error("invalid file name: {name:?}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
    },

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a file-not-found error.
    pub fn file_not_found(name: impl Into<String>) -> Self {
        Self::FileNotFound { name: name.into() }
    }

    /// Creates a file-exists error.
    pub fn file_exists(name: impl Into<String>) -> Self {
        Self::FileExists { name: name.into() }
    }
}
