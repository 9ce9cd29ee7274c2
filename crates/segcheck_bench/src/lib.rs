//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segcheck_core::merge::SegmentSizeInfo;
use segcheck_core::{FixedBitSet, SegmentDescriptor, SegmentId};
use segcheck_testkit::build_pattern;

/// Fixed seed so runs compare like with like.
pub const BENCH_SEED: u64 = 0x5eed;

/// Liveness pattern of `max_docs` bits with `live` set.
///
/// # Panics
///
/// Panics if `live > max_docs`.
pub fn pattern(max_docs: u32, live: u32) -> FixedBitSet {
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    build_pattern(max_docs, live, &mut rng).expect("live must not exceed max_docs")
}

/// Descriptor for a fresh segment with no deletions on disk.
///
/// # Panics
///
/// Panics if `max_docs` exceeds the document limit.
pub fn descriptor(name: &str, max_docs: u32) -> SegmentDescriptor {
    SegmentDescriptor::new(name, SegmentId::from_bytes([7; 16]), max_docs)
        .expect("max_docs within limit")
}

/// `count` segments with sizes spread over four orders of magnitude.
pub fn segment_sizes(count: usize) -> Vec<SegmentSizeInfo> {
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    (0..count)
        .map(|i| SegmentSizeInfo {
            name: format!("_{i}"),
            size_in_bytes: 1u64 << rng.gen_range(14u32..34),
            max_docs: rng.gen_range(1..1_000_000),
            del_count: 0,
        })
        .collect()
}
