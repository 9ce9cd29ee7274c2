//! File-system directory.

use crate::backend::StorageBackend;
use crate::directory::{validate_name, Directory, IoContext};
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// A directory mapping each file name to one OS file under a root path.
///
/// # Example
///
/// ```no_run
/// use segcheck_storage::{Directory, FsDirectory, IoContext};
/// use std::path::Path;
///
/// let dir = FsDirectory::open(Path::new("index")).unwrap();
/// dir.write_file("_0_1.liv", b"bits", &IoContext::Default).unwrap();
/// ```
#[derive(Debug)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Opens a directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be created or is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", root.display()),
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl Directory for FsDirectory {
    fn create_output(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        let path = self.resolve(name)?;
        trace!(path = %path.display(), %ctx, "creating file output");
        let backend = FileBackend::create_new(&path).map_err(|e| match e {
            StorageError::FileExists { .. } => StorageError::file_exists(name),
            other => other,
        })?;
        Ok(Box::new(backend))
    }

    fn open_input(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        let path = self.resolve(name)?;
        trace!(path = %path.display(), %ctx, "opening file input");
        let backend = FileBackend::open_existing(&path).map_err(|e| match e {
            StorageError::FileNotFound { .. } => StorageError::file_not_found(name),
            other => other,
        })?;
        Ok(Box::new(backend))
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> StorageResult<u64> {
        let path = self.resolve(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::file_not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_file(&self, name: &str) -> StorageResult<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::file_not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn sync(&self, names: &[String]) -> StorageResult<()> {
        for name in names {
            let path = self.resolve(name)?;
            let file = File::open(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StorageError::file_not_found(name.as_str()),
                _ => StorageError::Io(e),
            })?;
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fs_write_read_roundtrip() {
        let tmp = tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();

        dir.write_file("_a_1.liv", b"payload", &IoContext::Default).unwrap();
        assert_eq!(dir.file_length("_a_1.liv").unwrap(), 7);
        assert_eq!(dir.read_file("_a_1.liv", &IoContext::ReadOnce).unwrap(), b"payload");
        assert_eq!(dir.list_all().unwrap(), vec!["_a_1.liv".to_string()]);
    }

    #[test]
    fn fs_errors_name_the_file() {
        let tmp = tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();

        match dir.open_input("missing.liv", &IoContext::Default) {
            Err(StorageError::FileNotFound { name }) => assert_eq!(name, "missing.liv"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        dir.write_file("x", b"", &IoContext::Default).unwrap();
        match dir.create_output("x", &IoContext::Default) {
            Err(StorageError::FileExists { name }) => assert_eq!(name, "x"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn fs_delete_and_sync() {
        let tmp = tempdir().unwrap();
        let dir = FsDirectory::open(&tmp.path().join("nested")).unwrap();

        dir.write_file("f", b"1", &IoContext::Default).unwrap();
        dir.sync(&["f".to_string()]).unwrap();
        dir.delete_file("f").unwrap();
        assert!(dir.list_all().unwrap().is_empty());
        assert!(dir.sync(&["f".to_string()]).is_err());
    }
}
