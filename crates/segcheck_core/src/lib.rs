//! # segcheck core
//!
//! Segment-level adapters and verification tools for a codec-based
//! document store.
//!
//! This crate provides:
//! - Segment descriptors and liveness [`Bits`]
//! - The live-docs codec formats and in-memory format producers
//! - [`SegmentReader`] and the [`LeafReader`] wrappers built over it
//! - [`ThreadScopedCache`] for per-thread merge instances
//! - Size estimation and merge selection for merge-policy stress tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod codec;
mod error;
pub mod merge;
pub mod reader;
pub mod segment;
mod thread_cache;
mod types;

pub use bits::{Bits, DocIterator, FixedBitSet, MatchAllBits, PredicateBits, NO_MORE_DOCS};
pub use codec::{Codec, DefaultCodec, DenseCodec, LiveDocsFormat};
pub use error::{CoreError, CoreResult};
pub use reader::{CompositeReader, LeafReader, WrappedCompositeReader};
pub use segment::{SegmentProducers, SegmentReader};
pub use thread_cache::ThreadScopedCache;
pub use types::{CacheKey, DocId, SegmentDescriptor, SegmentId, MAX_DOCS, SEGMENT_ID_LEN};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
