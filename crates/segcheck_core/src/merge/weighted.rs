use crate::merge::{LogMergePolicy, SegmentSizeInfo, SizeEstimator};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Multipliers applied to a segment's size when it is weighted.
pub const WEIGHTS: [u64; 5] = [15, 17, 21, 22, 30];

/// Lower bound of the randomized maximum merge size.
const MIN_RANDOM_MAX_MERGE: u64 = 1024 * 1024;

/// Upper bound of the randomized maximum merge size.
const MAX_RANDOM_MAX_MERGE: u64 = i32::MAX as u64;

/// Sizes are weighted on every roll of this value on a 23-sided die, even
/// outside the high-activity window.
const ALWAYS_WEIGHT_ROLL: u32 = 5;

/// Source of the hour of day that selects the activity window.
pub trait ActivityClock: Send + Sync + fmt::Debug {
    /// Hour of day, `0..24`.
    fn hour_of_day(&self) -> u32;
}

/// Reads the hour from the system clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ActivityClock for SystemClock {
    fn hour_of_day(&self) -> u32 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        ((secs / 3600) % 24) as u32
    }
}

/// Always reports the same hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub u32);

impl ActivityClock for FixedClock {
    fn hour_of_day(&self) -> u32 {
        self.0 % 24
    }
}

/// A size estimator that inflates sizes at random.
///
/// During the high-activity window (before 06:00 and after 20:00) every
/// estimate is the true size times one of [`WEIGHTS`]. Outside it the true
/// size is returned, except on a 1 in 23 roll. The maximum merge size is
/// drawn from `[1 MiB, i32::MAX]` at construction.
///
/// A weighted size that would overflow `u64` falls back to the true size.
///
/// # Example
///
/// ```rust
/// use segcheck_core::merge::{FixedClock, SegmentSizeInfo, SizeEstimator, WeightedSizePolicy, WEIGHTS};
///
/// let policy = WeightedSizePolicy::new(42, FixedClock(3));
/// let segment = SegmentSizeInfo {
///     name: "_0".into(),
///     size_in_bytes: 100,
///     max_docs: 10,
///     del_count: 0,
/// };
/// let size = policy.size(&segment);
/// assert!(WEIGHTS.iter().any(|w| w * 100 == size));
/// ```
pub struct WeightedSizePolicy {
    rng: Mutex<StdRng>,
    clock: Box<dyn ActivityClock>,
    max_merge_size: u64,
}

impl WeightedSizePolicy {
    /// Creates a policy seeded with `seed`, reading hours from `clock`.
    pub fn new(seed: u64, clock: impl ActivityClock + 'static) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let max_merge_size = rng.gen_range(MIN_RANDOM_MAX_MERGE..=MAX_RANDOM_MAX_MERGE);
        debug!(seed, max_merge_size, ?clock, "created weighted size policy");
        Self {
            rng: Mutex::new(rng),
            clock: Box::new(clock),
            max_merge_size,
        }
    }

    /// Creates a policy seeded with `seed` on the system clock.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(seed, SystemClock)
    }

    /// The maximum merge size drawn at construction.
    #[must_use]
    pub fn max_merge_size(&self) -> u64 {
        self.max_merge_size
    }

    /// Returns `true` if `hour` lies in the high-activity window.
    #[must_use]
    pub fn is_high_activity(hour: u32) -> bool {
        hour < 6 || hour > 20
    }

    /// A [`LogMergePolicy`] sizing segments through this policy, capped at
    /// the randomized maximum merge size.
    #[must_use]
    pub fn into_merge_policy(self) -> LogMergePolicy {
        let max_merge_size = self.max_merge_size;
        LogMergePolicy::new(Arc::new(self)).max_merge_size(max_merge_size)
    }
}

impl SizeEstimator for WeightedSizePolicy {
    fn size(&self, segment: &SegmentSizeInfo) -> u64 {
        let hour = self.clock.hour_of_day();
        let mut rng = self.rng.lock();
        let weighted =
            Self::is_high_activity(hour) || rng.gen_range(0..23) == ALWAYS_WEIGHT_ROLL;
        if weighted {
            let weight = WEIGHTS[rng.gen_range(0..WEIGHTS.len())];
            segment
                .size_in_bytes
                .checked_mul(weight)
                .unwrap_or(segment.size_in_bytes)
        } else {
            segment.size_in_bytes
        }
    }
}

impl fmt::Debug for WeightedSizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedSizePolicy")
            .field("clock", &self.clock)
            .field("max_merge_size", &self.max_merge_size)
            .finish_non_exhaustive()
    }
}
