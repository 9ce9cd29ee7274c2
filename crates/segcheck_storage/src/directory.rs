//! Directory abstraction over named, write-once files.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Hint describing why a file is being opened.
///
/// Directories may use it to pick buffering or caching strategies; the
/// in-tree implementations only record it in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoContext {
    /// Ordinary access.
    #[default]
    Default,
    /// The file is read exactly once, front to back.
    ReadOnce,
    /// Written while flushing a new segment.
    Flush {
        /// Number of documents in the flushed segment.
        num_docs: u32,
    },
    /// Read or written by a background merge.
    Merge {
        /// Estimated size of the merged segment.
        estimated_bytes: u64,
    },
}

impl fmt::Display for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::ReadOnce => write!(f, "read-once"),
            Self::Flush { num_docs } => write!(f, "flush({num_docs} docs)"),
            Self::Merge { estimated_bytes } => write!(f, "merge({estimated_bytes} bytes)"),
        }
    }
}

/// A flat namespace of files.
///
/// Files are written once through [`Directory::create_output`] and then only
/// read. Codecs derive file names from segment metadata, so a directory never
/// needs to interpret names beyond rejecting path separators.
pub trait Directory: Send + Sync {
    /// Creates a new file and returns a handle to append to it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileExists`] if the name is taken.
    fn create_output(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>>;

    /// Opens an existing file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if no such file exists.
    fn open_input(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>>;

    /// Lists all file names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_all(&self) -> StorageResult<Vec<String>>;

    /// Returns the length of a file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if no such file exists.
    fn file_length(&self, name: &str) -> StorageResult<u64>;

    /// Deletes a file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if no such file exists.
    fn delete_file(&self, name: &str) -> StorageResult<()>;

    /// Makes the named files durable.
    ///
    /// # Errors
    ///
    /// Returns an error if any file is missing or cannot be synced.
    fn sync(&self, names: &[String]) -> StorageResult<()>;

    /// Writes `data` as a new file and syncs it.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Directory::create_output`] and the backend.
    fn write_file(&self, name: &str, data: &[u8], ctx: &IoContext) -> StorageResult<()> {
        let mut output = self.create_output(name, ctx)?;
        output.append(data)?;
        output.flush()?;
        output.sync()
    }

    /// Reads a whole file into memory.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Directory::open_input`] and the backend.
    fn read_file(&self, name: &str, ctx: &IoContext) -> StorageResult<Vec<u8>> {
        self.open_input(name, ctx)?.read_all()
    }

    /// Returns `true` if the named file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn file_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.list_all()?.iter().any(|n| n == name))
    }
}

/// Rejects names that would escape a flat directory.
pub(crate) fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StorageError::InvalidFileName {
            name: name.to_string(),
        });
    }
    Ok(())
}
