//! Stress tests for segcheck.
//!
//! These runs exercise per-thread caching and merge-instance wrappers under
//! concurrent access.

use crate::fixtures::memory_composite;
use segcheck_core::reader::{wrap_for_merge, MergeInstanceTransform};
use segcheck_core::{CoreResult, ThreadScopedCache, WrappedCompositeReader};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Document counts of the segments under test.
    pub segment_docs: Vec<u32>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            segment_docs: vec![100, 40, 250],
        }
    }
}

/// Hammers a [`ThreadScopedCache`] from `config.threads` threads.
///
/// An operation fails if a thread ever sees a value other than the one it
/// got first. Returns the result and the number of factory calls, which
/// must equal the thread count.
pub fn stress_thread_cache(config: &StressConfig) -> (StressTestResult, usize) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let cache: Arc<ThreadScopedCache<Arc<usize>>> = Arc::new(ThreadScopedCache::new(
        "stress",
        move || Ok(Some(Arc::new(counter.fetch_add(1, Ordering::SeqCst)))),
        |_| Ok(()),
    ));
    let barrier = Arc::new(Barrier::new(config.threads));

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let operations = config.operations;
            thread::spawn(move || {
                barrier.wait();
                let mut first: Option<Arc<usize>> = None;
                let (mut ok, mut failed) = (0usize, 0usize);
                for _ in 0..operations {
                    match (cache.get(), &first) {
                        (Ok(Some(value)), Some(seen)) if Arc::ptr_eq(&value, seen) => ok += 1,
                        (Ok(Some(value)), None) => {
                            first = Some(value);
                            ok += 1;
                        }
                        _ => failed += 1,
                    }
                }
                (ok, failed)
            })
        })
        .collect();

    let (successful, mut failed) = join_counts(handles);
    let duration = start.elapsed();
    if cache.close().is_err() {
        failed += 1;
    }
    (
        StressTestResult::new(successful, failed, duration),
        built.load(Ordering::SeqCst),
    )
}

/// Reads every document and doc value of a merge-wrapped composite from
/// `config.threads` threads, `config.operations` documents per thread.
///
/// Fails operations that return errors or wrong values. Closing the wrapper
/// counts as one more operation.
pub fn stress_merge_reads(config: &StressConfig) -> StressTestResult {
    let (reader, _stats) = memory_composite(&config.segment_docs, 1);
    let merging = match wrap_for_merge(reader) {
        Ok(merging) => Arc::new(merging),
        Err(_) => return StressTestResult::new(0, 1, Duration::ZERO),
    };
    let max_doc = merging.max_doc();
    if max_doc == 0 {
        return StressTestResult::new(0, 0, Duration::ZERO);
    }
    let barrier = Arc::new(Barrier::new(config.threads));

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let merging = Arc::clone(&merging);
            let barrier = Arc::clone(&barrier);
            let operations = config.operations;
            thread::spawn(move || {
                barrier.wait();
                let (mut ok, mut failed) = (0usize, 0usize);
                for i in 0..operations {
                    let doc = ((t * 7919 + i) % max_doc as usize) as u32;
                    match check_doc(&merging, doc) {
                        Ok(true) => ok += 1,
                        _ => failed += 1,
                    }
                }
                (ok, failed)
            })
        })
        .collect();

    let (mut successful, mut failed) = join_counts(handles);
    match merging.close() {
        Ok(()) => successful += 1,
        Err(_) => failed += 1,
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

fn check_doc(
    merging: &WrappedCompositeReader<MergeInstanceTransform>,
    doc: u32,
) -> CoreResult<bool> {
    let (leaf, local) = merging.view().leaf_for_doc(doc)?;
    let fields = leaf.reader.document(local)?;
    let rank = leaf.reader.numeric_doc_value("rank", local)?;
    Ok(fields.contains_key("id") && rank == Some(i64::from(local) * 10))
}

fn join_counts(handles: Vec<thread::JoinHandle<(usize, usize)>>) -> (usize, usize) {
    handles
        .into_iter()
        .map(|h| h.join().unwrap_or((0, 1)))
        .fold((0, 0), |(ok, failed), (o, f)| (ok + o, failed + f))
}
