//! Property-based test generators using proptest.
//!
//! Strategies here always produce parameters a conforming codec must accept,
//! so a failing case points at the codec rather than the generator.

use crate::error::BitsRepresentation;
use proptest::prelude::*;
use segcheck_core::{SegmentId, SEGMENT_ID_LEN};

/// Parameters of one live-docs round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialParams {
    /// Declared document count.
    pub max_docs: u32,
    /// Live documents, always `< max_docs`.
    pub num_live: u32,
    /// How the writer sees the pattern.
    pub representation: BitsRepresentation,
    /// Seed for the liveness pattern.
    pub seed: u64,
}

/// Strategy for the two bits representations.
pub fn representation_strategy() -> impl Strategy<Value = BitsRepresentation> {
    prop_oneof![
        Just(BitsRepresentation::FixedBitSet),
        Just(BitsRepresentation::Predicate),
    ]
}

/// Strategy for segment ids.
pub fn segment_id_strategy() -> impl Strategy<Value = SegmentId> {
    any::<[u8; SEGMENT_ID_LEN]>().prop_map(SegmentId::from_bytes)
}

/// Strategy for trial parameters with `max_docs` in `min_docs..=max_docs`.
///
/// # Panics
///
/// Panics if `min_docs` is zero or greater than `max_docs`.
pub fn trial_params_strategy(
    min_docs: u32,
    max_docs: u32,
) -> impl Strategy<Value = TrialParams> {
    assert!(min_docs >= 1 && min_docs <= max_docs, "bad doc range");
    (min_docs..=max_docs)
        .prop_flat_map(|max_docs| {
            (
                Just(max_docs),
                0..max_docs,
                representation_strategy(),
                any::<u64>(),
            )
        })
        .prop_map(|(max_docs, num_live, representation, seed)| TrialParams {
            max_docs,
            num_live,
            representation,
            seed,
        })
}

/// Strategy for liveness patterns as explicit vectors of `len` flags.
pub fn liveness_strategy(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), len)
}

/// Strategy for segment byte sizes, skewed toward small segments.
pub fn segment_size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        4 => 1u64..(1 << 20),
        2 => (1u64 << 20)..(1 << 30),
        1 => (1u64 << 30)..(1 << 34),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
