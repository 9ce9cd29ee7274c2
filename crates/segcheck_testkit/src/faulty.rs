//! Fault injection for directories.

use segcheck_storage::{Directory, IoContext, StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// A [`Directory`] that fails creating or opening files on demand.
///
/// Listing, length and delete calls always pass through, so a test can
/// still inspect and clean up the wrapped directory.
///
/// # Example
///
/// ```rust
/// use segcheck_storage::{Directory, IoContext, RamDirectory};
/// use segcheck_testkit::FaultyDirectory;
///
/// let dir = FaultyDirectory::new(RamDirectory::new());
/// dir.fail_writes(true);
/// assert!(dir.write_file("a", b"x", &IoContext::Default).is_err());
/// dir.fail_writes(false);
/// assert!(dir.write_file("a", b"x", &IoContext::Default).is_ok());
/// ```
#[derive(Debug)]
pub struct FaultyDirectory<D> {
    inner: D,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    injected: AtomicUsize,
}

impl<D: Directory> FaultyDirectory<D> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
        }
    }

    /// Arms or disarms write failures.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Arms or disarms read failures.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of failures injected so far.
    #[must_use]
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    /// The wrapped directory.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn inject(&self, op: &'static str, name: &str) -> StorageError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        debug!(op, name, "injecting storage fault");
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("injected {op} failure for {name}"),
        ))
    }
}

impl<D: Directory> Directory for FaultyDirectory<D> {
    fn create_output(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.inject("write", name));
        }
        self.inner.create_output(name, ctx)
    }

    fn open_input(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(self.inject("read", name));
        }
        self.inner.open_input(name, ctx)
    }

    fn list_all(&self) -> StorageResult<Vec<String>> {
        self.inner.list_all()
    }

    fn file_length(&self, name: &str) -> StorageResult<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> StorageResult<()> {
        self.inner.delete_file(name)
    }

    fn sync(&self, names: &[String]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.inject("sync", &names.join(",")));
        }
        self.inner.sync(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segcheck_storage::RamDirectory;

    #[test]
    fn read_faults_leave_files_intact() {
        let dir = FaultyDirectory::new(RamDirectory::new());
        dir.write_file("f", b"data", &IoContext::Default).unwrap();

        dir.fail_reads(true);
        assert!(matches!(
            dir.read_file("f", &IoContext::ReadOnce),
            Err(StorageError::Io(_))
        ));
        assert_eq!(dir.list_all().unwrap(), vec!["f".to_string()]);
        assert_eq!(dir.injected(), 1);

        dir.fail_reads(false);
        assert_eq!(dir.read_file("f", &IoContext::ReadOnce).unwrap(), b"data");
    }
}
