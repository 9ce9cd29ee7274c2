//! Leaf readers and the wrappers built over them.
//!
//! A [`LeafTransform`] turns one leaf into another view of the same
//! segment; [`WrappedCompositeReader`] lifts it over every leaf of a
//! [`CompositeReader`]. Three transforms ship with the crate:
//!
//! - [`MergeInstanceTransform`] gives each merge thread its own producers
//! - [`AssertingTransform`] re-checks reader contracts on every call
//! - [`MismatchedTransform`] changes each leaf's apparent identity
//!
//! ## Example
//!
//! ```rust
//! use segcheck_core::codec::MemorySegmentBuilder;
//! use segcheck_core::reader::{wrap_for_merge, CompositeReader, LeafReader};
//! use segcheck_core::segment::SegmentReader;
//! use segcheck_core::{SegmentDescriptor, SegmentId};
//! use std::sync::Arc;
//!
//! let (producers, _) = MemorySegmentBuilder::new(1).stored(0, "id", b"1").build();
//! let descriptor = SegmentDescriptor::new("_0", SegmentId::random(), 1).unwrap();
//! let leaf: Arc<dyn LeafReader> =
//!     Arc::new(SegmentReader::new(descriptor, producers, None).unwrap());
//! let composite = Arc::new(CompositeReader::new(vec![leaf], 1).unwrap());
//!
//! let merging = wrap_for_merge(Arc::clone(&composite)).unwrap();
//! assert_eq!(merging.cache_key(), composite.cache_key());
//! assert_eq!(merging.document(0).unwrap()["id"], b"1".to_vec());
//! merging.close().unwrap();
//! ```

mod asserting;
mod composite;
mod leaf;
mod merge_instance;
mod mismatched;

pub use asserting::{AssertingDocIterator, AssertingLeafReader};
pub use composite::{CompositeReader, LeafContext, LeafTransform, WrappedCompositeReader};
pub use leaf::LeafReader;
pub use merge_instance::MergeInstanceReader;
pub use mismatched::MismatchedLeafReader;

use crate::error::CoreResult;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Wraps leaves in [`MergeInstanceReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeInstanceTransform;

impl LeafTransform for MergeInstanceTransform {
    fn wrap(&self, leaf: Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>> {
        Ok(Arc::new(MergeInstanceReader::new(leaf)?))
    }
}

/// Wraps leaves in [`AssertingLeafReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertingTransform;

impl LeafTransform for AssertingTransform {
    fn wrap(&self, leaf: Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>> {
        Ok(Arc::new(AssertingLeafReader::new(leaf)?))
    }
}

/// Wraps leaves in [`MismatchedLeafReader`], drawing each leaf's shuffle
/// seed from one seeded generator.
#[derive(Debug)]
pub struct MismatchedTransform {
    rng: Mutex<StdRng>,
}

impl MismatchedTransform {
    /// Creates a transform whose shuffles are reproducible from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl LeafTransform for MismatchedTransform {
    fn wrap(&self, leaf: Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>> {
        let seed = self.rng.lock().gen();
        Ok(Arc::new(MismatchedLeafReader::new(leaf, seed)))
    }
}

/// Wraps every leaf so producer access returns per-thread merge instances.
///
/// # Errors
///
/// Returns an error if a leaf's producers cannot be obtained.
pub fn wrap_for_merge(
    reader: Arc<CompositeReader>,
) -> CoreResult<WrappedCompositeReader<MergeInstanceTransform>> {
    WrappedCompositeReader::new(reader, MergeInstanceTransform)
}

/// Wraps every leaf in an [`AssertingLeafReader`].
///
/// # Errors
///
/// Returns [`crate::CoreError::ContractViolation`] if a leaf's live docs
/// disagree with its counts.
pub fn wrap_asserting(
    reader: Arc<CompositeReader>,
) -> CoreResult<WrappedCompositeReader<AssertingTransform>> {
    WrappedCompositeReader::new(reader, AssertingTransform)
}

/// Wraps every leaf in a [`MismatchedLeafReader`].
///
/// # Errors
///
/// Does not fail for well-formed composites; the `Result` matches the other
/// wrap functions.
pub fn wrap_mismatched(
    reader: Arc<CompositeReader>,
    seed: u64,
) -> CoreResult<WrappedCompositeReader<MismatchedTransform>> {
    WrappedCompositeReader::new(reader, MismatchedTransform::new(seed))
}
