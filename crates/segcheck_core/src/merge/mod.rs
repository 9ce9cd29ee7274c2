//! Size estimation and merge selection.
//!
//! [`LogMergePolicy`] groups segments into size levels and proposes merges
//! of `merge_factor` adjacent segments on the same level. How big a segment
//! is, as far as the policy is concerned, is decided by an injected
//! [`SizeEstimator`]; [`WeightedSizePolicy`] is an estimator that lies about
//! sizes in legal ways, for tests that must not depend on the true size.

mod policy;
mod weighted;

pub use policy::{LogMergePolicy, MergeCandidate};
pub use weighted::{ActivityClock, FixedClock, SystemClock, WeightedSizePolicy, WEIGHTS};

use crate::types::SegmentDescriptor;
use std::fmt;

/// What a merge policy knows about a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSizeInfo {
    /// Segment name.
    pub name: String,
    /// Bytes on disk.
    pub size_in_bytes: u64,
    /// Documents, deleted included.
    pub max_docs: u32,
    /// Deleted documents.
    pub del_count: u32,
}

impl SegmentSizeInfo {
    /// Describes `descriptor` with the given on-disk size.
    #[must_use]
    pub fn from_descriptor(descriptor: &SegmentDescriptor, size_in_bytes: u64) -> Self {
        Self {
            name: descriptor.name().to_string(),
            size_in_bytes,
            max_docs: descriptor.max_docs(),
            del_count: descriptor.del_count(),
        }
    }
}

/// Decides the size a merge policy sees for a segment.
pub trait SizeEstimator: Send + Sync + fmt::Debug {
    /// Estimated size of `segment` in bytes.
    fn size(&self, segment: &SegmentSizeInfo) -> u64;
}

/// Reports the true on-disk size.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueSize;

impl SizeEstimator for TrueSize {
    fn size(&self, segment: &SegmentSizeInfo) -> u64 {
        segment.size_in_bytes
    }
}
