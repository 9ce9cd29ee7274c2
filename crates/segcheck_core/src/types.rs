//! Core type definitions for segcheck.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Document number inside one segment, in `0..max_docs`.
pub type DocId = u32;

/// Largest document count a segment may declare.
///
/// Owned by the surrounding engine; kept a little below `i32::MAX` so
/// per-segment arithmetic in 32-bit signed formats never wraps.
pub const MAX_DOCS: u32 = i32::MAX as u32 - 128;

/// Length in bytes of a [`SegmentId`].
pub const SEGMENT_ID_LEN: usize = 16;

/// Opaque fixed-length identifier of a segment.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId([u8; SEGMENT_ID_LEN]);

impl SegmentId {
    /// Creates a segment ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SEGMENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a new random segment ID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SEGMENT_ID_LEN] {
        &self.0
    }

    /// Lower-case hex rendering, 32 characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        Uuid::from_bytes(self.0).simple().to_string()
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.to_hex())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Immutable key addressing one generation of a segment's persisted state.
///
/// A descriptor never changes in place; advancing the delete generation
/// produces a new descriptor with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
    name: String,
    id: SegmentId,
    max_docs: u32,
    del_count: u32,
    del_gen: u64,
}

impl SegmentDescriptor {
    /// Creates a descriptor for a segment with no deletions on disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `max_docs` exceeds
    /// [`MAX_DOCS`] or the name is empty.
    pub fn new(name: impl Into<String>, id: SegmentId, max_docs: u32) -> CoreResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::invalid_argument("segment name must not be empty"));
        }
        if max_docs > MAX_DOCS {
            return Err(CoreError::invalid_argument(format!(
                "max_docs {max_docs} exceeds limit {MAX_DOCS}"
            )));
        }
        Ok(Self {
            name,
            id,
            max_docs,
            del_count: 0,
            del_gen: 0,
        })
    }

    /// Returns a copy carrying the given delete count and generation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `del_count > max_docs`.
    pub fn with_deletes(&self, del_count: u32, del_gen: u64) -> CoreResult<Self> {
        if del_count > self.max_docs {
            return Err(CoreError::invalid_argument(format!(
                "del_count {del_count} exceeds max_docs {}",
                self.max_docs
            )));
        }
        Ok(Self {
            del_count,
            del_gen,
            ..self.clone()
        })
    }

    /// Returns the descriptor for the next delete generation after
    /// `new_del_count` more documents were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the total delete count would
    /// exceed `max_docs`.
    pub fn advance_del_gen(&self, new_del_count: u32) -> CoreResult<Self> {
        let total = self
            .del_count
            .checked_add(new_del_count)
            .ok_or_else(|| CoreError::invalid_argument("delete count overflow"))?;
        self.with_deletes(total, self.next_del_gen())
    }

    /// Segment name, unique within a directory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment id.
    #[must_use]
    pub const fn id(&self) -> SegmentId {
        self.id
    }

    /// Declared document count.
    #[must_use]
    pub const fn max_docs(&self) -> u32 {
        self.max_docs
    }

    /// Number of deleted documents in the current generation.
    #[must_use]
    pub const fn del_count(&self) -> u32 {
        self.del_count
    }

    /// Current delete generation; 0 means no live-docs file exists.
    #[must_use]
    pub const fn del_gen(&self) -> u64 {
        self.del_gen
    }

    /// Generation the next live-docs write goes to.
    #[must_use]
    pub const fn next_del_gen(&self) -> u64 {
        self.del_gen + 1
    }

    /// Number of live documents in the current generation.
    #[must_use]
    pub const fn num_live_docs(&self) -> u32 {
        self.max_docs - self.del_count
    }

    /// Returns `true` if a live-docs file exists for this generation.
    #[must_use]
    pub const fn has_deletions(&self) -> bool {
        self.del_gen > 0
    }

    /// File name of the live-docs file for `gen`: `<name>_<gen base36>.liv`.
    #[must_use]
    pub fn live_docs_file_name(&self, gen: u64) -> String {
        format!("{}_{}.liv", self.name, to_base36(gen))
    }
}

impl fmt::Display for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}):{}/{}@{}",
            self.name, self.id, self.max_docs, self.del_count, self.del_gen
        )
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Identity key used by caches to de-duplicate per-reader state.
///
/// Cheap to clone; equality is by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Creates a key from any string.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Core key of a segment: stable across delete generations.
    #[must_use]
    pub fn for_core(descriptor: &SegmentDescriptor) -> Self {
        Self::new(format!("{}@{}", descriptor.name(), descriptor.id()))
    }

    /// Reader key of a segment: changes with every delete generation.
    #[must_use]
    pub fn for_reader(descriptor: &SegmentDescriptor) -> Self {
        Self::new(format!(
            "{}@{}#{}",
            descriptor.name(),
            descriptor.id(),
            descriptor.del_gen()
        ))
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
