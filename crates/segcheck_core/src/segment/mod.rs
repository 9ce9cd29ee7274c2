//! Segment readers.
//!
//! A [`SegmentReader`] is the immutable per-segment view every wrapper in
//! [`crate::reader`] builds on. It owns the segment's [`SegmentProducers`]
//! and, when the segment has deletions, the live docs loaded through the
//! segment's codec.

mod reader;

pub use reader::{SegmentProducers, SegmentReader};
