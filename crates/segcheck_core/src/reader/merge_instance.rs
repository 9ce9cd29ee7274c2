use crate::bits::Bits;
use crate::codec::{same_instance, DocValuesProducer, NormsProducer, StoredFieldsReader};
use crate::error::{CoreError, CoreResult};
use crate::reader::LeafReader;
use crate::thread_cache::ThreadScopedCache;
use crate::types::CacheKey;
use std::fmt;
use std::sync::Arc;

/// A leaf reader whose producer accessors return merge instances.
///
/// Each calling thread gets its own merge instance of each producer, built
/// on first access and kept until the wrapper is closed. Closing releases
/// only the instances this wrapper obtained; an instance that is the wrapped
/// reader's own producer is left open. Everything else, cache keys included,
/// passes through to the wrapped reader.
pub struct MergeInstanceReader {
    inner: Arc<dyn LeafReader>,
    stored: ThreadScopedCache<Arc<dyn StoredFieldsReader>>,
    norms: ThreadScopedCache<Arc<dyn NormsProducer>>,
    doc_values: ThreadScopedCache<Arc<dyn DocValuesProducer>>,
}

fn merge_cache<P>(
    name: &'static str,
    original: Option<Arc<P>>,
    merge_instance: fn(Arc<P>) -> CoreResult<Option<Arc<P>>>,
    close: fn(&P) -> CoreResult<()>,
) -> ThreadScopedCache<Arc<P>>
where
    P: ?Sized + Send + Sync + 'static,
{
    let for_release = original.clone();
    ThreadScopedCache::new(
        name,
        move || match &original {
            Some(producer) => merge_instance(Arc::clone(producer)),
            None => Ok(None),
        },
        move |instance| match &for_release {
            Some(producer) if same_instance(producer, instance) => Ok(()),
            _ => close(instance),
        },
    )
}

impl MergeInstanceReader {
    /// Wraps `inner`, snapshotting its producers.
    ///
    /// # Errors
    ///
    /// Returns an error if a producer of `inner` cannot be obtained.
    pub fn new(inner: Arc<dyn LeafReader>) -> CoreResult<Self> {
        Ok(Self {
            stored: merge_cache(
                "stored fields merge instances",
                inner.stored_fields_reader()?,
                |p| p.merge_instance(),
                |p| p.close(),
            ),
            norms: merge_cache(
                "norms merge instances",
                inner.norms_reader()?,
                |p| p.merge_instance(),
                |p| p.close(),
            ),
            doc_values: merge_cache(
                "doc values merge instances",
                inner.doc_values_reader()?,
                |p| p.merge_instance(),
                |p| p.close(),
            ),
            inner,
        })
    }

    /// The wrapped reader.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn LeafReader> {
        &self.inner
    }

    /// Number of merge instances currently held, across all threads and
    /// producer kinds.
    #[must_use]
    pub fn cached_instances(&self) -> usize {
        self.stored.len() + self.norms.len() + self.doc_values.len()
    }
}

impl fmt::Debug for MergeInstanceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeInstanceReader")
            .field("segment", &self.inner.name())
            .field("stored", &self.stored)
            .field("norms", &self.norms)
            .field("doc_values", &self.doc_values)
            .finish()
    }
}

impl LeafReader for MergeInstanceReader {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn max_doc(&self) -> u32 {
        self.inner.max_doc()
    }

    fn num_docs(&self) -> u32 {
        self.inner.num_docs()
    }

    fn live_docs(&self) -> Option<Arc<dyn Bits>> {
        self.inner.live_docs()
    }

    fn core_cache_key(&self) -> &CacheKey {
        self.inner.core_cache_key()
    }

    fn reader_cache_key(&self) -> &CacheKey {
        self.inner.reader_cache_key()
    }

    fn field_names(&self) -> &[String] {
        self.inner.field_names()
    }

    fn stored_fields_reader(&self) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
        self.stored.get()
    }

    fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        self.norms.get()
    }

    fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        self.doc_values.get()
    }

    fn close(&self) -> CoreResult<()> {
        let failures = [self.stored.close(), self.norms.close(), self.doc_values.close()]
            .into_iter()
            .filter_map(Result::err)
            .flat_map(|err| match err {
                CoreError::CloseFailed { failures } => failures,
                other => vec![other],
            })
            .collect();
        CoreError::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MemorySegmentBuilder, MemoryStats};
    use crate::segment::SegmentReader;
    use crate::types::{SegmentDescriptor, SegmentId};
    use std::thread;

    fn segment() -> (Arc<dyn LeafReader>, MemoryStats) {
        let (producers, stats) = MemorySegmentBuilder::new(3)
            .stored(0, "title", b"zero")
            .stored(1, "title", b"one")
            .norm("title", 1, 5)
            .build();
        let descriptor = SegmentDescriptor::new("_0", SegmentId::random(), 3).unwrap();
        let reader = SegmentReader::new(descriptor, producers, None).unwrap();
        (Arc::new(reader), stats)
    }

    #[test]
    fn keys_pass_through() {
        let (inner, _) = segment();
        let a = MergeInstanceReader::new(Arc::clone(&inner)).unwrap();
        let b = MergeInstanceReader::new(Arc::clone(&inner)).unwrap();
        assert_eq!(a.core_cache_key(), inner.core_cache_key());
        assert_eq!(a.reader_cache_key(), inner.reader_cache_key());
        assert_eq!(a.core_cache_key(), b.core_cache_key());
        assert_eq!(a.reader_cache_key(), b.reader_cache_key());
    }

    #[test]
    fn each_thread_gets_its_own_stored_fields_instance() {
        let (inner, stats) = segment();
        let original = inner.stored_fields_reader().unwrap().unwrap();
        let wrapper = Arc::new(MergeInstanceReader::new(inner).unwrap());

        let mine = wrapper.stored_fields_reader().unwrap().unwrap();
        assert!(same_instance(&mine, &wrapper.stored_fields_reader().unwrap().unwrap()));
        assert!(!same_instance(&mine, &original));

        let other = Arc::clone(&wrapper);
        let theirs = thread::spawn(move || other.stored_fields_reader().unwrap().unwrap())
            .join()
            .unwrap();
        assert!(!same_instance(&mine, &theirs));
        assert_eq!(stats.stored.merge_instances(), 2);

        assert_eq!(wrapper.document(1).unwrap()["title"], b"one".to_vec());

        wrapper.close().unwrap();
        assert_eq!(stats.stored.closed(), 2);
        assert!(original.document(0).is_ok());
    }

    #[test]
    fn stateless_instance_is_not_closed() {
        let (inner, stats) = segment();
        let wrapper = MergeInstanceReader::new(Arc::clone(&inner)).unwrap();
        assert_eq!(wrapper.norm("title", 1).unwrap(), Some(5));
        assert_eq!(stats.norms.merge_instances(), 1);

        wrapper.close().unwrap();
        assert_eq!(stats.norms.closed(), 0);
        assert_eq!(inner.norm("title", 1).unwrap(), Some(5));
    }

    #[test]
    fn absent_feature_reports_absence() {
        let (inner, _) = segment();
        let wrapper = MergeInstanceReader::new(inner).unwrap();
        assert!(wrapper.doc_values_reader().unwrap().is_none());
        assert_eq!(wrapper.numeric_doc_value("title", 0).unwrap(), None);
        assert_eq!(wrapper.cached_instances(), 0);
    }

    #[test]
    fn use_after_close_fails() {
        let (inner, _) = segment();
        let wrapper = MergeInstanceReader::new(inner).unwrap();
        wrapper.close().unwrap();
        assert!(matches!(
            wrapper.document(0),
            Err(CoreError::AlreadyClosed { .. })
        ));
    }
}
