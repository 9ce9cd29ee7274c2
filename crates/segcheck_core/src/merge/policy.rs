use crate::error::{CoreError, CoreResult};
use crate::merge::{SegmentSizeInfo, SizeEstimator, TrueSize};
use std::sync::Arc;
use tracing::trace;

/// Width of one size level, in levels of `log(size) / log(merge_factor)`.
const LEVEL_LOG_SPAN: f64 = 0.75;

/// Segments proposed for one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCandidate {
    /// Names of the segments, adjacent and in index order.
    pub segments: Vec<String>,
    /// Sum of the estimated sizes.
    pub estimated_bytes: u64,
}

/// Merges adjacent segments of similar size in groups of `merge_factor`.
///
/// Sizes come from the injected [`SizeEstimator`]. Segments whose estimated
/// size reaches `max_merge_size` are never merged, and everything below
/// `min_merge_size` counts as one level.
///
/// # Example
///
/// ```rust
/// use segcheck_core::merge::{LogMergePolicy, SegmentSizeInfo};
///
/// let policy = LogMergePolicy::default().merge_factor(2);
/// let segments: Vec<_> = (0..4)
///     .map(|i| SegmentSizeInfo {
///         name: format!("_{i}"),
///         size_in_bytes: 1000,
///         max_docs: 10,
///         del_count: 0,
///     })
///     .collect();
/// let merges = policy.find_merges(&segments).unwrap();
/// assert_eq!(merges.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct LogMergePolicy {
    estimator: Arc<dyn SizeEstimator>,
    merge_factor: usize,
    min_merge_size: u64,
    max_merge_size: u64,
}

impl Default for LogMergePolicy {
    fn default() -> Self {
        Self {
            estimator: Arc::new(TrueSize),
            merge_factor: 10,
            min_merge_size: 1_677_721, // 1.6 MiB
            max_merge_size: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl LogMergePolicy {
    /// Creates a policy with default thresholds and the given estimator.
    #[must_use]
    pub fn new(estimator: Arc<dyn SizeEstimator>) -> Self {
        Self {
            estimator,
            ..Self::default()
        }
    }

    /// Sets how many segments are merged at once.
    #[must_use]
    pub fn merge_factor(mut self, merge_factor: usize) -> Self {
        self.merge_factor = merge_factor;
        self
    }

    /// Sets the size below which all segments share the lowest level.
    #[must_use]
    pub fn min_merge_size(mut self, bytes: u64) -> Self {
        self.min_merge_size = bytes;
        self
    }

    /// Sets the estimated size at which a segment is no longer merged.
    #[must_use]
    pub fn max_merge_size(mut self, bytes: u64) -> Self {
        self.max_merge_size = bytes;
        self
    }

    /// The size estimator.
    #[must_use]
    pub fn estimator(&self) -> &Arc<dyn SizeEstimator> {
        &self.estimator
    }

    /// Estimated size at which a segment is no longer merged.
    #[must_use]
    pub fn max_merge_bytes(&self) -> u64 {
        self.max_merge_size
    }

    /// Proposes merges over `segments`, given in index order.
    ///
    /// Each segment is sized once through the estimator.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `merge_factor < 2`.
    pub fn find_merges(&self, segments: &[SegmentSizeInfo]) -> CoreResult<Vec<MergeCandidate>> {
        if self.merge_factor < 2 {
            return Err(CoreError::invalid_argument(format!(
                "merge_factor must be at least 2, got {}",
                self.merge_factor
            )));
        }

        let norm = (self.merge_factor as f64).ln();
        let level_of = |bytes: u64| (bytes.max(1) as f64).ln() / norm;
        let sizes: Vec<u64> = segments.iter().map(|s| self.estimator.size(s)).collect();
        let levels: Vec<f64> = sizes
            .iter()
            .map(|&size| level_of(size.max(self.min_merge_size)))
            .collect();
        let level_floor = level_of(self.min_merge_size);

        let mut merges = Vec::new();
        let mut start = 0;
        while start < segments.len() {
            let max_level = levels[start..]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);

            let level_bottom = if max_level <= level_floor {
                -1.0
            } else {
                (max_level - LEVEL_LOG_SPAN).max(level_floor)
            };

            // Last segment at or above the bottom of this level.
            let upto = (start..segments.len())
                .rev()
                .find(|&i| levels[i] >= level_bottom)
                .unwrap_or(start);

            let mut end = start + self.merge_factor;
            while end <= upto + 1 {
                let window = start..end;
                if sizes[window.clone()].iter().all(|&s| s < self.max_merge_size) {
                    let candidate = MergeCandidate {
                        segments: segments[window.clone()]
                            .iter()
                            .map(|s| s.name.clone())
                            .collect(),
                        estimated_bytes: sizes[window]
                            .iter()
                            .fold(0u64, |acc, &s| acc.saturating_add(s)),
                    };
                    trace!(
                        segments = ?candidate.segments,
                        bytes = candidate.estimated_bytes,
                        level = max_level,
                        "proposing merge"
                    );
                    merges.push(candidate);
                }
                start = end;
                end = start + self.merge_factor;
            }
            start = upto + 1;
        }
        Ok(merges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(name: &str, size: u64) -> SegmentSizeInfo {
        SegmentSizeInfo {
            name: name.to_string(),
            size_in_bytes: size,
            max_docs: 100,
            del_count: 0,
        }
    }

    #[derive(Debug)]
    struct Doubled;

    impl SizeEstimator for Doubled {
        fn size(&self, segment: &SegmentSizeInfo) -> u64 {
            segment.size_in_bytes * 2
        }
    }

    #[test]
    fn small_segments_merge_in_groups() {
        let segments: Vec<_> = (0..7).map(|i| seg(&format!("_{i}"), 10)).collect();
        let merges = LogMergePolicy::default()
            .merge_factor(3)
            .find_merges(&segments)
            .unwrap();
        assert_eq!(merges.len(), 2);
        assert_eq!(merges[0].segments, vec!["_0", "_1", "_2"]);
        assert_eq!(merges[1].segments, vec!["_3", "_4", "_5"]);
        assert_eq!(merges[0].estimated_bytes, 30);
    }

    #[test]
    fn too_few_segments_no_merge() {
        let segments = vec![seg("_0", 10), seg("_1", 10)];
        assert!(LogMergePolicy::default()
            .find_merges(&segments)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn oversized_segments_are_skipped() {
        let segments = vec![seg("_0", 500), seg("_1", 500), seg("_2", 10), seg("_3", 10)];
        let merges = LogMergePolicy::default()
            .merge_factor(2)
            .max_merge_size(400)
            .find_merges(&segments)
            .unwrap();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].segments, vec!["_2", "_3"]);
    }

    #[test]
    fn large_segment_separates_levels() {
        let big = 1u64 << 30;
        let segments = vec![
            seg("_0", big),
            seg("_1", 10),
            seg("_2", 10),
            seg("_3", 10),
        ];
        let merges = LogMergePolicy::default()
            .merge_factor(3)
            .find_merges(&segments)
            .unwrap();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].segments, vec!["_1", "_2", "_3"]);
    }

    #[test]
    fn estimator_decides_max_size() {
        let segments = vec![seg("_0", 300), seg("_1", 300)];
        let true_size = LogMergePolicy::default()
            .merge_factor(2)
            .max_merge_size(500)
            .find_merges(&segments)
            .unwrap();
        assert_eq!(true_size.len(), 1);

        let doubled = LogMergePolicy::new(Arc::new(Doubled))
            .merge_factor(2)
            .max_merge_size(500)
            .find_merges(&segments)
            .unwrap();
        assert!(doubled.is_empty());
    }

    #[test]
    fn rejects_degenerate_merge_factor() {
        assert!(LogMergePolicy::default()
            .merge_factor(1)
            .find_merges(&[seg("_0", 1)])
            .is_err());
    }
}
