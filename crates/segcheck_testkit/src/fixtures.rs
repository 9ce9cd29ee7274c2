//! Test fixtures for directories and readers.
//!
//! Fixture constructors panic on setup failure, the way test setup usually
//! does; they are not meant for production paths.

use segcheck_core::codec::{MemorySegmentBuilder, MemoryStats};
use segcheck_core::{CompositeReader, LeafReader, SegmentDescriptor, SegmentId, SegmentReader};
use segcheck_storage::FsDirectory;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A filesystem directory removed when dropped.
pub struct TestDirectory {
    /// The directory instance.
    pub dir: FsDirectory,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestDirectory {
    /// Creates an empty directory under the system temp location.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = FsDirectory::open(temp_dir.path()).expect("Failed to open directory");
        Self { dir, temp_dir }
    }

    /// Path of the directory on disk.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TestDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDirectory {
    type Target = FsDirectory;

    fn deref(&self) -> &Self::Target {
        &self.dir
    }
}

/// Runs a test with a temporary filesystem directory.
///
/// # Example
///
/// ```rust
/// use segcheck_storage::{Directory, IoContext};
/// use segcheck_testkit::with_temp_dir;
///
/// with_temp_dir(|dir| {
///     dir.write_file("_0_1.liv", b"x", &IoContext::Default).unwrap();
///     assert!(dir.file_exists("_0_1.liv").unwrap());
/// });
/// ```
pub fn with_temp_dir<F, R>(f: F) -> R
where
    F: FnOnce(&FsDirectory) -> R,
{
    let test_dir = TestDirectory::new();
    f(&test_dir.dir)
}

/// Builds an in-memory segment of `max_doc` documents with no deletions.
///
/// Every document stores `id = "{name}:{doc}"`, has norm `len = doc + 1`,
/// and numeric doc value `rank = doc * 10`.
pub fn memory_leaf(name: &str, max_doc: u32) -> (Arc<dyn LeafReader>, MemoryStats) {
    let mut builder = MemorySegmentBuilder::new(max_doc);
    for doc in 0..max_doc {
        builder = builder
            .stored(doc, "id", format!("{name}:{doc}").as_bytes())
            .norm("len", doc, i64::from(doc) + 1)
            .numeric("rank", doc, i64::from(doc) * 10);
    }
    let (producers, stats) = builder.build();
    let descriptor =
        SegmentDescriptor::new(name, SegmentId::random(), max_doc).expect("Invalid descriptor");
    let reader = SegmentReader::new(descriptor, producers, None).expect("Failed to open segment");
    (Arc::new(reader), stats)
}

/// Builds a composite over memory segments named `_0`, `_1`, ... with the
/// given document counts.
pub fn memory_composite(doc_counts: &[u32], version: u64) -> (Arc<CompositeReader>, Vec<MemoryStats>) {
    let (leaves, stats): (Vec<_>, Vec<_>) = doc_counts
        .iter()
        .enumerate()
        .map(|(i, &max_doc)| memory_leaf(&format!("_{i}"), max_doc))
        .unzip();
    let reader = CompositeReader::new(leaves, version).expect("Failed to build composite");
    (Arc::new(reader), stats)
}
