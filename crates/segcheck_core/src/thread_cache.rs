//! Per-thread lazily constructed values.
//!
//! [`ThreadScopedCache`] is an explicit registry from [`ThreadId`] to a value
//! built on the thread's first access. The owner drains it with
//! [`ThreadScopedCache::close`], which releases every value ever built,
//! including those of threads that have since exited.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

type Factory<T> = Box<dyn Fn() -> CoreResult<Option<T>> + Send + Sync>;
type Release<T> = Box<dyn Fn(&T) -> CoreResult<()> + Send + Sync>;

/// A cache holding at most one value per calling thread.
///
/// The factory runs outside the slot lock, and only the calling thread ever
/// writes its own slot, so construction happens at most once per thread and
/// a slow factory never blocks other threads' lookups. A factory error is
/// returned to the caller and leaves the slot empty, so a later call retries.
///
/// A factory may return `Ok(None)` to report that there is nothing to build;
/// nothing is cached in that case.
///
/// `close` must not race with `get` from other threads.
///
/// # Example
///
/// ```rust
/// use segcheck_core::ThreadScopedCache;
/// use std::sync::Arc;
///
/// let cache = ThreadScopedCache::new("example", || Ok(Some(Arc::new(7))), |_| Ok(()));
/// let a = cache.get().unwrap().unwrap();
/// let b = cache.get().unwrap().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// cache.close().unwrap();
/// assert!(cache.get().is_err());
/// ```
pub struct ThreadScopedCache<T> {
    name: &'static str,
    slots: RwLock<HashMap<ThreadId, T>>,
    factory: Factory<T>,
    release: Release<T>,
    closed: AtomicBool,
}

impl<T: Clone> ThreadScopedCache<T> {
    /// Creates an empty cache.
    ///
    /// `name` labels log lines and errors.
    pub fn new<F, R>(name: &'static str, factory: F, release: R) -> Self
    where
        F: Fn() -> CoreResult<Option<T>> + Send + Sync + 'static,
        R: Fn(&T) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            name,
            slots: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
            release: Box::new(release),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the calling thread's value, building it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyClosed`] after [`close`](Self::close), or
    /// whatever the factory returned.
    pub fn get(&self) -> CoreResult<Option<T>> {
        let id = thread::current().id();
        if let Some(value) = self.slots.read().get(&id) {
            return Ok(Some(value.clone()));
        }
        if self.is_closed() {
            return Err(CoreError::already_closed(self.name));
        }

        let Some(value) = (self.factory)()? else {
            return Ok(None);
        };

        let mut slots = self.slots.write();
        if self.is_closed() {
            drop(slots);
            (self.release)(&value)?;
            return Err(CoreError::already_closed(self.name));
        }
        slots.insert(id, value.clone());
        debug!(cache = self.name, thread = ?id, entries = slots.len(), "built thread-scoped value");
        Ok(Some(value))
    }

    /// Releases every cached value and empties the cache.
    ///
    /// Every value is released even if some releases fail.
    ///
    /// # Errors
    ///
    /// Returns the single release error, or [`CoreError::CloseFailed`]
    /// carrying all of them.
    pub fn close(&self) -> CoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let drained = std::mem::take(&mut *self.slots.write());
        let count = drained.len();

        let failures: Vec<CoreError> = drained
            .into_values()
            .filter_map(|value| (self.release)(&value).err())
            .collect();

        if failures.is_empty() {
            debug!(cache = self.name, released = count, "closed thread-scoped cache");
        } else {
            warn!(
                cache = self.name,
                released = count,
                failed = failures.len(),
                "thread-scoped cache closed with release failures"
            );
        }
        CoreError::from_failures(failures)
    }

    /// Number of threads holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns `true` if no thread holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for ThreadScopedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScopedCache")
            .field("name", &self.name)
            .field("entries", &self.slots.read().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    fn counting_cache() -> (Arc<ThreadScopedCache<Arc<usize>>>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let cache = ThreadScopedCache::new(
            "test",
            move || Ok(Some(Arc::new(counter.fetch_add(1, Ordering::SeqCst)))),
            |_| Ok(()),
        );
        (Arc::new(cache), built)
    }

    #[test]
    fn one_construction_per_thread() {
        const THREADS: usize = 8;
        let (cache, built) = counting_cache();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let first = cache.get().unwrap().unwrap();
                    for _ in 0..100 {
                        let again = cache.get().unwrap().unwrap();
                        assert!(Arc::ptr_eq(&first, &again));
                    }
                    *first
                })
            })
            .collect();

        let mut seen: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        seen.dedup();

        assert_eq!(built.load(Ordering::SeqCst), THREADS);
        assert_eq!(seen.len(), THREADS);
        assert_eq!(cache.len(), THREADS);
    }

    #[test]
    fn factory_failure_does_not_poison_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let cache = Arc::new(ThreadScopedCache::new(
            "flaky",
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CoreError::invalid_argument("first build fails"))
                } else {
                    Ok(Some(Arc::new(1u8)))
                }
            },
            |_| Ok(()),
        ));

        assert!(matches!(
            cache.get(),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(cache.is_empty());

        let other = Arc::clone(&cache);
        let from_other = thread::spawn(move || other.get().unwrap().is_some())
            .join()
            .unwrap();
        assert!(from_other);

        assert!(cache.get().unwrap().is_some());
        assert_eq!(cache.len(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn absent_value_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ThreadScopedCache<Arc<u8>> = ThreadScopedCache::new(
            "absent",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            |_| Ok(()),
        );
        assert!(cache.get().unwrap().is_none());
        assert!(cache.get().unwrap().is_none());
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_releases_every_value_and_aggregates_failures() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let cache = Arc::new(ThreadScopedCache::new(
            "failing",
            || Ok(Some(Arc::new(()))),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::invalid_argument("release failed"))
            },
        ));

        for _ in 0..3 {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get().unwrap();
            })
            .join()
            .unwrap();
        }
        assert_eq!(cache.len(), 3);

        match cache.close() {
            Err(CoreError::CloseFailed { failures }) => assert_eq!(failures.len(), 3),
            other => panic!("expected CloseFailed, got {other:?}"),
        }
        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
        assert!(cache.close().is_ok());
    }

    #[test]
    fn get_after_close_fails_fast() {
        let (cache, built) = counting_cache();
        cache.get().unwrap();
        cache.close().unwrap();
        assert!(matches!(cache.get(), Err(CoreError::AlreadyClosed { .. })));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
