//! In-memory directory.

use crate::backend::StorageBackend;
use crate::directory::{validate_name, Directory, IoContext};
use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryBackend;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::trace;

/// A directory that keeps every file in memory.
///
/// Each independent conformance trial gets its own `RamDirectory`, so trials
/// can run concurrently without sharing state.
///
/// # Example
///
/// ```rust
/// use segcheck_storage::{Directory, IoContext, RamDirectory};
///
/// let dir = RamDirectory::new();
/// dir.write_file("_0_1.liv", b"bits", &IoContext::Default).unwrap();
/// assert_eq!(dir.read_file("_0_1.liv", &IoContext::ReadOnce).unwrap(), b"bits");
/// ```
#[derive(Debug, Default)]
pub struct RamDirectory {
    files: RwLock<BTreeMap<String, InMemoryBackend>>,
}

impl RamDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes held across all files.
    #[must_use]
    pub fn ram_bytes_used(&self) -> u64 {
        self.files.read().values().map(|f| f.data().len() as u64).sum()
    }
}

impl Directory for RamDirectory {
    fn create_output(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        validate_name(name)?;
        let mut files = self.files.write();
        if files.contains_key(name) {
            return Err(StorageError::file_exists(name));
        }
        trace!(name, %ctx, "creating in-memory output");
        let backend = InMemoryBackend::new();
        files.insert(name.to_string(), backend.clone());
        Ok(Box::new(backend))
    }

    fn open_input(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        let files = self.files.read();
        let backend = files.get(name).ok_or_else(|| StorageError::file_not_found(name))?;
        trace!(name, %ctx, "opening in-memory input");
        Ok(Box::new(backend.clone()))
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_length(&self, name: &str) -> StorageResult<u64> {
        self.files
            .read()
            .get(name)
            .ok_or_else(|| StorageError::file_not_found(name))?
            .size()
    }

    fn delete_file(&self, name: &str) -> StorageResult<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::file_not_found(name))
    }

    fn sync(&self, names: &[String]) -> StorageResult<()> {
        let files = self.files.read();
        for name in names {
            if !files.contains_key(name) {
                return Err(StorageError::file_not_found(name.as_str()));
            }
        }
        Ok(())
    }
}
