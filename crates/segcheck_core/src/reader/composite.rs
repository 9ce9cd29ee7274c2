use crate::codec::{same_instance, StoredDocument};
use crate::error::{CoreError, CoreResult};
use crate::reader::LeafReader;
use crate::types::{CacheKey, DocId, MAX_DOCS};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Turns one leaf into another view of the same segment.
///
/// Implemented for any `Fn(Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>>`.
pub trait LeafTransform: Send + Sync {
    /// Wraps `leaf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the wrapper cannot be built.
    fn wrap(&self, leaf: Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>>;
}

impl<F> LeafTransform for F
where
    F: Fn(Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>> + Send + Sync,
{
    fn wrap(&self, leaf: Arc<dyn LeafReader>) -> CoreResult<Arc<dyn LeafReader>> {
        self(leaf)
    }
}

/// A leaf together with its position in a composite reader.
#[derive(Clone)]
pub struct LeafContext {
    /// Index of the leaf.
    pub ord: usize,
    /// Composite doc id of the leaf's doc 0.
    pub doc_base: u32,
    /// The leaf.
    pub reader: Arc<dyn LeafReader>,
}

impl fmt::Debug for LeafContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafContext")
            .field("ord", &self.ord)
            .field("doc_base", &self.doc_base)
            .field("segment", &self.reader.name())
            .field("max_doc", &self.reader.max_doc())
            .finish()
    }
}

/// An ordered set of leaves read as one logical index.
///
/// Composite doc ids number the leaves' documents consecutively in leaf
/// order.
#[derive(Debug)]
pub struct CompositeReader {
    leaves: Vec<LeafContext>,
    max_doc: u32,
    num_docs: u32,
    version: u64,
    cache_key: CacheKey,
}

impl CompositeReader {
    /// Creates a composite over `leaves` with a fresh cache key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the leaves hold more than
    /// [`MAX_DOCS`] documents in total.
    pub fn new(leaves: Vec<Arc<dyn LeafReader>>, version: u64) -> CoreResult<Self> {
        let key = CacheKey::new(format!("composite@{}", Uuid::new_v4().simple()));
        Self::with_cache_key(leaves, version, key)
    }

    /// Creates a composite over `leaves` that reports `cache_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the leaves hold more than
    /// [`MAX_DOCS`] documents in total.
    pub fn with_cache_key(
        leaves: Vec<Arc<dyn LeafReader>>,
        version: u64,
        cache_key: CacheKey,
    ) -> CoreResult<Self> {
        let mut contexts = Vec::with_capacity(leaves.len());
        let mut max_doc: u64 = 0;
        let mut num_docs: u64 = 0;
        for (ord, reader) in leaves.into_iter().enumerate() {
            let doc_base = max_doc as u32;
            max_doc += u64::from(reader.max_doc());
            num_docs += u64::from(reader.num_docs());
            if max_doc > u64::from(MAX_DOCS) {
                return Err(CoreError::invalid_argument(format!(
                    "composite of {} leaves exceeds {MAX_DOCS} documents",
                    ord + 1
                )));
            }
            contexts.push(LeafContext {
                ord,
                doc_base,
                reader,
            });
        }
        Ok(Self {
            leaves: contexts,
            max_doc: max_doc as u32,
            num_docs: num_docs as u32,
            version,
            cache_key,
        })
    }

    /// Leaves in order.
    #[must_use]
    pub fn leaves(&self) -> &[LeafContext] {
        &self.leaves
    }

    /// Total documents across leaves, deleted included.
    #[must_use]
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Total live documents across leaves.
    #[must_use]
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Version of the index this composite was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Top-level cache key.
    #[must_use]
    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    /// Finds the leaf holding composite doc `doc` and the doc's id inside it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] if `doc >= max_doc`.
    pub fn leaf_for_doc(&self, doc: DocId) -> CoreResult<(&LeafContext, DocId)> {
        if doc >= self.max_doc {
            return Err(CoreError::DocOutOfBounds {
                doc,
                max_doc: self.max_doc,
            });
        }
        // Last leaf whose base is <= doc; empty leaves share a base with
        // their successor, so skip past them.
        let idx = self.leaves.partition_point(|leaf| leaf.doc_base <= doc) - 1;
        let leaf = &self.leaves[idx];
        Ok((leaf, doc - leaf.doc_base))
    }

    /// Loads the stored fields of composite doc `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] or the leaf's error.
    pub fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        let (leaf, local) = self.leaf_for_doc(doc)?;
        leaf.reader.document(local)
    }

    /// Closes every leaf, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns the aggregated close failures.
    pub fn close(&self) -> CoreResult<()> {
        close_leaves(&self.leaves)
    }
}

fn close_leaves(leaves: &[LeafContext]) -> CoreResult<()> {
    let failures: Vec<CoreError> = leaves
        .iter()
        .filter_map(|leaf| leaf.reader.close().err())
        .collect();
    if !failures.is_empty() {
        warn!(failed = failures.len(), "failed to close leaves");
    }
    CoreError::from_failures(failures)
}

/// A composite reader whose leaves have been passed through a
/// [`LeafTransform`].
///
/// Leaf order, doc numbering, version and top-level cache key are those of
/// the wrapped composite. Closing closes the wrappers only.
pub struct WrappedCompositeReader<T> {
    inner: Arc<CompositeReader>,
    view: CompositeReader,
    transform: Arc<T>,
}

impl<T: LeafTransform> WrappedCompositeReader<T> {
    /// Applies `transform` to every leaf of `inner`.
    ///
    /// # Errors
    ///
    /// Returns the transform's error. Wrappers built before the failure are
    /// closed.
    pub fn new(inner: Arc<CompositeReader>, transform: T) -> CoreResult<Self> {
        Self::build(inner, Arc::new(transform))
    }

    fn build(inner: Arc<CompositeReader>, transform: Arc<T>) -> CoreResult<Self> {
        let mut wrapped: Vec<Arc<dyn LeafReader>> = Vec::with_capacity(inner.leaves().len());
        for leaf in inner.leaves() {
            match transform.wrap(Arc::clone(&leaf.reader)) {
                Ok(reader) => wrapped.push(reader),
                Err(err) => {
                    for (reader, original) in wrapped.iter().zip(inner.leaves()) {
                        if same_instance(reader, &original.reader) {
                            continue;
                        }
                        if let Err(close_err) = reader.close() {
                            warn!(segment = reader.name(), error = %close_err, "failed to close partial wrapper");
                        }
                    }
                    return Err(err);
                }
            }
        }
        let view =
            CompositeReader::with_cache_key(wrapped, inner.version(), inner.cache_key().clone())?;
        debug!(
            leaves = view.leaves().len(),
            version = view.version(),
            "wrapped composite reader"
        );
        Ok(Self {
            inner,
            view,
            transform,
        })
    }

    /// The unwrapped composite.
    #[must_use]
    pub fn inner(&self) -> &Arc<CompositeReader> {
        &self.inner
    }

    /// The wrapped view.
    #[must_use]
    pub fn view(&self) -> &CompositeReader {
        &self.view
    }

    /// Wrapped leaves in order.
    #[must_use]
    pub fn leaves(&self) -> &[LeafContext] {
        self.view.leaves()
    }

    /// Version of the wrapped composite.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.view.version()
    }

    /// Cache key of the wrapped composite.
    #[must_use]
    pub fn cache_key(&self) -> &CacheKey {
        self.view.cache_key()
    }

    /// Total documents, deleted included.
    #[must_use]
    pub fn max_doc(&self) -> u32 {
        self.view.max_doc()
    }

    /// Loads the stored fields of composite doc `doc` through the wrappers.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] or the leaf's error.
    pub fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        self.view.document(doc)
    }

    /// Re-wraps `newer` with the same transform if its version differs.
    ///
    /// Returns `None` when `newer` is at the current version. The old
    /// wrapper stays valid and must still be closed by its owner.
    ///
    /// # Errors
    ///
    /// Returns the transform's error.
    pub fn refresh(&self, newer: Arc<CompositeReader>) -> CoreResult<Option<Self>> {
        if newer.version() == self.version() {
            return Ok(None);
        }
        debug!(from = self.version(), to = newer.version(), "refreshing wrapped reader");
        Self::build(newer, Arc::clone(&self.transform)).map(Some)
    }

    /// Closes the leaf wrappers. The wrapped composite stays open, including
    /// any leaf the transform passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the aggregated close failures.
    pub fn close(&self) -> CoreResult<()> {
        let failures: Vec<CoreError> = self
            .view
            .leaves()
            .iter()
            .zip(self.inner.leaves())
            .filter(|(wrapped, original)| !same_instance(&wrapped.reader, &original.reader))
            .filter_map(|(wrapped, _)| wrapped.reader.close().err())
            .collect();
        if !failures.is_empty() {
            warn!(failed = failures.len(), "failed to close leaf wrappers");
        }
        CoreError::from_failures(failures)
    }
}

impl<T> fmt::Debug for WrappedCompositeReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedCompositeReader")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemorySegmentBuilder;
    use crate::segment::SegmentReader;
    use crate::types::{SegmentDescriptor, SegmentId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn leaf(name: &str, max_doc: u32) -> Arc<dyn LeafReader> {
        let mut builder = MemorySegmentBuilder::new(max_doc);
        for doc in 0..max_doc {
            builder = builder.stored(doc, "id", format!("{name}/{doc}").as_bytes());
        }
        let (producers, _) = builder.build();
        let descriptor = SegmentDescriptor::new(name, SegmentId::random(), max_doc).unwrap();
        Arc::new(SegmentReader::new(descriptor, producers, None).unwrap())
    }

    fn composite(version: u64) -> Arc<CompositeReader> {
        Arc::new(
            CompositeReader::new(vec![leaf("_0", 3), leaf("_1", 0), leaf("_2", 2)], version)
                .unwrap(),
        )
    }

    #[test]
    fn doc_bases_and_lookup() {
        let reader = composite(1);
        let bases: Vec<u32> = reader.leaves().iter().map(|l| l.doc_base).collect();
        assert_eq!(bases, vec![0, 3, 3]);
        assert_eq!(reader.max_doc(), 5);

        let (leaf, local) = reader.leaf_for_doc(3).unwrap();
        assert_eq!(leaf.ord, 2);
        assert_eq!(local, 0);
        assert_eq!(reader.document(4).unwrap()["id"], b"_2/1".to_vec());
        assert!(reader.leaf_for_doc(5).is_err());
    }

    #[test]
    fn transform_preserves_order_and_key() {
        let reader = composite(1);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let identity = move |leaf: Arc<dyn LeafReader>| -> CoreResult<Arc<dyn LeafReader>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(leaf)
        };
        let wrapped = WrappedCompositeReader::new(Arc::clone(&reader), identity).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(wrapped.cache_key(), reader.cache_key());
        assert_eq!(wrapped.version(), 1);
        let names: Vec<&str> = wrapped.leaves().iter().map(|l| l.reader.name()).collect();
        assert_eq!(names, vec!["_0", "_1", "_2"]);
        assert_eq!(wrapped.document(2).unwrap()["id"], b"_0/2".to_vec());
    }

    #[test]
    fn refresh_reapplies_only_on_new_version() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let identity = move |leaf: Arc<dyn LeafReader>| -> CoreResult<Arc<dyn LeafReader>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(leaf)
        };
        let wrapped = WrappedCompositeReader::new(composite(1), identity).unwrap();

        assert!(wrapped.refresh(composite(1)).unwrap().is_none());
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        let newer = composite(2);
        let refreshed = wrapped.refresh(Arc::clone(&newer)).unwrap().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert_eq!(refreshed.version(), 2);
        assert_eq!(refreshed.cache_key(), newer.cache_key());
    }

    #[test]
    fn failing_transform_propagates() {
        let reject_last = |leaf: Arc<dyn LeafReader>| -> CoreResult<Arc<dyn LeafReader>> {
            if leaf.name() == "_2" {
                Err(CoreError::invalid_argument("no"))
            } else {
                Ok(leaf)
            }
        };
        let reader = composite(1);
        let result = WrappedCompositeReader::new(Arc::clone(&reader), reject_last);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
        assert_eq!(reader.document(0).unwrap()["id"], b"_0/0".to_vec());
    }

    #[test]
    fn closing_pass_through_wrapper_keeps_original_open() {
        let (producers, stats) = MemorySegmentBuilder::new(1).stored(0, "id", b"a").build();
        let descriptor = SegmentDescriptor::new("_0", SegmentId::random(), 1).unwrap();
        let original: Arc<dyn LeafReader> =
            Arc::new(SegmentReader::new(descriptor, producers, None).unwrap());
        let reader = Arc::new(CompositeReader::new(vec![original], 1).unwrap());

        let identity = |leaf: Arc<dyn LeafReader>| -> CoreResult<Arc<dyn LeafReader>> { Ok(leaf) };
        let wrapped = WrappedCompositeReader::new(Arc::clone(&reader), identity).unwrap();
        wrapped.close().unwrap();

        assert_eq!(stats.stored.closed(), 0);
        assert_eq!(reader.document(0).unwrap()["id"], b"a".to_vec());
    }
}
