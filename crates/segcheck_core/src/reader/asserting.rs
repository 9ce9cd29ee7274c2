use crate::bits::{cardinality, Bits, DocIterator, NO_MORE_DOCS};
use crate::codec::{
    same_instance, DocValuesProducer, NormsProducer, StoredDocument, StoredFieldsReader,
};
use crate::error::{CoreError, CoreResult};
use crate::reader::LeafReader;
use crate::types::{CacheKey, DocId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A leaf reader that re-checks reader contracts on every call.
///
/// Construction validates that the live docs agree with `max_doc` and
/// `num_docs`. Afterwards every document access is bounds-checked, use after
/// close is rejected, and live-docs iterators are wrapped in an
/// [`AssertingDocIterator`]. Producers handed out by the accessors carry the
/// same checks, and so do their merge instances. Violations surface as
/// [`CoreError::ContractViolation`].
pub struct AssertingLeafReader {
    inner: Arc<dyn LeafReader>,
    guard: Arc<DocGuard>,
}

/// Bounds and liveness checks shared by a reader and its producers.
struct DocGuard {
    segment: String,
    max_doc: u32,
    closed: AtomicBool,
}

impl DocGuard {
    fn check_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::contract_violation(format!(
                "{}: reader used after close",
                self.segment
            )));
        }
        Ok(())
    }

    fn check_doc(&self, doc: DocId) -> CoreResult<()> {
        self.check_open()?;
        if doc >= self.max_doc {
            return Err(CoreError::contract_violation(format!(
                "{}: doc {doc} out of bounds for max_doc {}",
                self.segment, self.max_doc
            )));
        }
        Ok(())
    }
}

impl AssertingLeafReader {
    /// Wraps `inner` after validating its live docs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContractViolation`] if the live docs disagree
    /// with the reader's document counts.
    pub fn new(inner: Arc<dyn LeafReader>) -> CoreResult<Self> {
        let max_doc = inner.max_doc();
        let num_docs = inner.num_docs();
        if num_docs > max_doc {
            return Err(CoreError::contract_violation(format!(
                "{}: num_docs {num_docs} exceeds max_doc {max_doc}",
                inner.name()
            )));
        }
        match inner.live_docs() {
            Some(bits) => {
                if bits.len() != max_doc {
                    return Err(CoreError::contract_violation(format!(
                        "{}: live docs length {} != max_doc {max_doc}",
                        inner.name(),
                        bits.len()
                    )));
                }
                let live = cardinality(bits.as_ref());
                if live != u64::from(num_docs) {
                    return Err(CoreError::contract_violation(format!(
                        "{}: {live} live docs but num_docs is {num_docs}",
                        inner.name()
                    )));
                }
            }
            None if num_docs != max_doc => {
                return Err(CoreError::contract_violation(format!(
                    "{}: no live docs but num_docs {num_docs} != max_doc {max_doc}",
                    inner.name()
                )));
            }
            None => {}
        }
        let guard = Arc::new(DocGuard {
            segment: inner.name().to_string(),
            max_doc,
            closed: AtomicBool::new(false),
        });
        Ok(Self { inner, guard })
    }

    /// The wrapped reader.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn LeafReader> {
        &self.inner
    }

    fn check_open(&self) -> CoreResult<()> {
        self.guard.check_open()
    }

    fn check_doc(&self, doc: DocId) -> CoreResult<()> {
        self.guard.check_doc(doc)
    }
}

impl fmt::Debug for AssertingLeafReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertingLeafReader")
            .field("segment", &self.inner.name())
            .field("closed", &self.guard.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl LeafReader for AssertingLeafReader {
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
        self.check_open()?;
        Ok(self.inner.stored_fields_reader()?.map(|inner| {
            Arc::new(AssertingStoredFields {
                inner,
                guard: Arc::clone(&self.guard),
            }) as Arc<dyn StoredFieldsReader>
        }))
    }

    fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        self.check_open()?;
        Ok(self.inner.norms_reader()?.map(|inner| {
            Arc::new(AssertingNorms {
                inner,
                guard: Arc::clone(&self.guard),
            }) as Arc<dyn NormsProducer>
        }))
    }

    fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        self.check_open()?;
        Ok(self.inner.doc_values_reader()?.map(|inner| {
            Arc::new(AssertingDocValues {
                inner,
                guard: Arc::clone(&self.guard),
            }) as Arc<dyn DocValuesProducer>
        }))
    }

    fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        self.check_doc(doc)?;
        self.inner.document(doc)
    }

    fn norm(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        self.check_doc(doc)?;
        self.inner.norm(field, doc)
    }

    fn numeric_doc_value(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        self.check_doc(doc)?;
        self.inner.numeric_doc_value(field, doc)
    }

    fn binary_doc_value(&self, field: &str, doc: DocId) -> CoreResult<Option<Vec<u8>>> {
        self.check_doc(doc)?;
        self.inner.binary_doc_value(field, doc)
    }

    fn live_docs_iter(&self) -> Box<dyn DocIterator> {
        Box::new(AssertingDocIterator::new(
            self.inner.live_docs_iter(),
            self.inner.max_doc(),
        ))
    }

    fn close(&self) -> CoreResult<()> {
        self.guard.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// Producer wrappers. A merge instance that is the inner producer itself maps
// back to the same wrapper, so callers comparing instances see no change.

struct AssertingStoredFields {
    inner: Arc<dyn StoredFieldsReader>,
    guard: Arc<DocGuard>,
}

impl StoredFieldsReader for AssertingStoredFields {
    fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        self.guard.check_doc(doc)?;
        self.inner.document(doc)
    }

    fn check_integrity(&self) -> CoreResult<()> {
        self.guard.check_open()?;
        self.inner.check_integrity()
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
        self.guard.check_open()?;
        let Some(instance) = Arc::clone(&self.inner).merge_instance()? else {
            return Ok(None);
        };
        if same_instance(&instance, &self.inner) {
            return Ok(Some(self));
        }
        Ok(Some(Arc::new(Self {
            inner: instance,
            guard: Arc::clone(&self.guard),
        })))
    }

    fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }
}

struct AssertingNorms {
    inner: Arc<dyn NormsProducer>,
    guard: Arc<DocGuard>,
}

impl NormsProducer for AssertingNorms {
    fn norm(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        self.guard.check_doc(doc)?;
        self.inner.norm(field, doc)
    }

    fn check_integrity(&self) -> CoreResult<()> {
        self.guard.check_open()?;
        self.inner.check_integrity()
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        self.guard.check_open()?;
        let Some(instance) = Arc::clone(&self.inner).merge_instance()? else {
            return Ok(None);
        };
        if same_instance(&instance, &self.inner) {
            return Ok(Some(self));
        }
        Ok(Some(Arc::new(Self {
            inner: instance,
            guard: Arc::clone(&self.guard),
        })))
    }

    fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }
}

struct AssertingDocValues {
    inner: Arc<dyn DocValuesProducer>,
    guard: Arc<DocGuard>,
}

impl DocValuesProducer for AssertingDocValues {
    fn numeric(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        self.guard.check_doc(doc)?;
        self.inner.numeric(field, doc)
    }

    fn binary(&self, field: &str, doc: DocId) -> CoreResult<Option<Vec<u8>>> {
        self.guard.check_doc(doc)?;
        self.inner.binary(field, doc)
    }

    fn check_integrity(&self) -> CoreResult<()> {
        self.guard.check_open()?;
        self.inner.check_integrity()
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        self.guard.check_open()?;
        let Some(instance) = Arc::clone(&self.inner).merge_instance()? else {
            return Ok(None);
        };
        if same_instance(&instance, &self.inner) {
            return Ok(Some(self));
        }
        Ok(Some(Arc::new(Self {
            inner: instance,
            guard: Arc::clone(&self.guard),
        })))
    }

    fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Unpositioned,
    On(DocId),
    Exhausted,
}

/// A [`DocIterator`] that checks the iteration contract.
///
/// Returned docs must be strictly increasing and below `max_doc`, `advance`
/// must move forward and land on or after its target, and the iterator must
/// not be used again once it returned [`NO_MORE_DOCS`].
pub struct AssertingDocIterator {
    inner: Box<dyn DocIterator>,
    max_doc: u32,
    state: IterState,
}

impl AssertingDocIterator {
    /// Wraps `inner`, whose docs must lie in `0..max_doc`.
    pub fn new(inner: Box<dyn DocIterator>, max_doc: u32) -> Self {
        Self {
            inner,
            max_doc,
            state: IterState::Unpositioned,
        }
    }

    fn check_usable(&self, op: &str) -> CoreResult<()> {
        if self.state == IterState::Exhausted {
            return Err(CoreError::contract_violation(format!(
                "{op} called on an exhausted iterator"
            )));
        }
        Ok(())
    }

    fn accept(&mut self, doc: DocId, lower: Option<DocId>) -> CoreResult<DocId> {
        if doc == NO_MORE_DOCS {
            self.state = IterState::Exhausted;
            return Ok(doc);
        }
        if doc >= self.max_doc {
            return Err(CoreError::contract_violation(format!(
                "iterator returned doc {doc} beyond max_doc {}",
                self.max_doc
            )));
        }
        if let IterState::On(current) = self.state {
            if doc <= current {
                return Err(CoreError::contract_violation(format!(
                    "iterator went from doc {current} to {doc}"
                )));
            }
        }
        if let Some(target) = lower {
            if doc < target {
                return Err(CoreError::contract_violation(format!(
                    "advance({target}) landed on {doc}"
                )));
            }
        }
        self.state = IterState::On(doc);
        Ok(doc)
    }
}

impl DocIterator for AssertingDocIterator {
    fn doc_id(&self) -> Option<DocId> {
        match self.state {
            IterState::Unpositioned => None,
            IterState::On(doc) => Some(doc),
            IterState::Exhausted => Some(NO_MORE_DOCS),
        }
    }

    fn next_doc(&mut self) -> CoreResult<DocId> {
        self.check_usable("next_doc")?;
        let doc = self.inner.next_doc()?;
        self.accept(doc, None)
    }

    fn advance(&mut self, target: DocId) -> CoreResult<DocId> {
        self.check_usable("advance")?;
        if let IterState::On(current) = self.state {
            if target <= current {
                return Err(CoreError::contract_violation(format!(
                    "advance target {target} must be greater than current doc {current}"
                )));
            }
        }
        let doc = self.inner.advance(target)?;
        self.accept(doc, Some(target))
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{FixedBitSet, LiveDocsIterator};
    use crate::codec::MemorySegmentBuilder;
    use crate::segment::SegmentReader;
    use crate::types::{SegmentDescriptor, SegmentId};

    fn reader_with_deletes() -> Arc<dyn LeafReader> {
        let mut bits = FixedBitSet::full(5);
        bits.clear(2);
        let descriptor = SegmentDescriptor::new("_1", SegmentId::random(), 5)
            .unwrap()
            .with_deletes(1, 1)
            .unwrap();
        let (producers, _) = MemorySegmentBuilder::new(5).stored(4, "f", b"v").build();
        Arc::new(SegmentReader::new(descriptor, producers, Some(Arc::new(bits))).unwrap())
    }

    /// Yields a fixed sequence, ignoring targets.
    struct Scripted(Vec<DocId>);

    impl DocIterator for Scripted {
        fn doc_id(&self) -> Option<DocId> {
            None
        }

        fn next_doc(&mut self) -> CoreResult<DocId> {
            Ok(if self.0.is_empty() {
                NO_MORE_DOCS
            } else {
                self.0.remove(0)
            })
        }

        fn advance(&mut self, _target: DocId) -> CoreResult<DocId> {
            self.next_doc()
        }

        fn cost(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[test]
    fn keys_and_content_pass_through() {
        let inner = reader_with_deletes();
        let wrapped = AssertingLeafReader::new(Arc::clone(&inner)).unwrap();
        assert_eq!(wrapped.core_cache_key(), inner.core_cache_key());
        assert_eq!(wrapped.reader_cache_key(), inner.reader_cache_key());
        assert_eq!(wrapped.document(4).unwrap()["f"], b"v".to_vec());
    }

    #[test]
    fn out_of_bounds_access_is_a_violation() {
        let wrapped = AssertingLeafReader::new(reader_with_deletes()).unwrap();
        assert!(matches!(
            wrapped.document(5),
            Err(CoreError::ContractViolation { .. })
        ));
        assert!(matches!(
            wrapped.norm("f", 99),
            Err(CoreError::ContractViolation { .. })
        ));
    }

    #[test]
    fn use_after_close_is_a_violation() {
        let wrapped = AssertingLeafReader::new(reader_with_deletes()).unwrap();
        wrapped.close().unwrap();
        assert!(matches!(
            wrapped.document(0),
            Err(CoreError::ContractViolation { .. })
        ));
    }

    #[test]
    fn producers_carry_the_reader_checks() {
        let (producers, stats) = MemorySegmentBuilder::new(3)
            .stored(1, "f", b"v")
            .norm("f", 1, 7)
            .numeric("n", 2, 9)
            .build();
        let descriptor = SegmentDescriptor::new("_2", SegmentId::random(), 3).unwrap();
        let inner: Arc<dyn LeafReader> =
            Arc::new(SegmentReader::new(descriptor, producers, None).unwrap());
        let wrapped = AssertingLeafReader::new(inner).unwrap();

        let stored = wrapped.stored_fields_reader().unwrap().unwrap();
        assert_eq!(stored.document(1).unwrap()["f"], b"v".to_vec());
        assert!(matches!(
            stored.document(3),
            Err(CoreError::ContractViolation { .. })
        ));
        let doc_values = wrapped.doc_values_reader().unwrap().unwrap();
        assert_eq!(doc_values.numeric("n", 2).unwrap(), Some(9));
        assert!(matches!(
            doc_values.binary("n", 7),
            Err(CoreError::ContractViolation { .. })
        ));

        // Stateless norms: the merge instance is the wrapper itself.
        let norms = wrapped.norms_reader().unwrap().unwrap();
        let instance = Arc::clone(&norms).merge_instance().unwrap().unwrap();
        assert!(same_instance(&norms, &instance));

        // A cloned merge instance keeps the checks.
        let clone = Arc::clone(&stored).merge_instance().unwrap().unwrap();
        assert!(!same_instance(&stored, &clone));
        assert!(clone.document(3).is_err());
        assert_eq!(stats.stored.merge_instances(), 1);

        wrapped.close().unwrap();
        assert!(matches!(
            norms.norm("f", 1),
            Err(CoreError::ContractViolation { .. })
        ));
        assert!(clone.document(1).is_err());
    }

    #[test]
    fn live_docs_iteration_skips_deleted() {
        let wrapped = AssertingLeafReader::new(reader_with_deletes()).unwrap();
        let mut it = wrapped.live_docs_iter();
        assert_eq!(it.next_doc().unwrap(), 0);
        assert_eq!(it.advance(2).unwrap(), 3);
        assert_eq!(it.next_doc().unwrap(), 4);
        assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
        assert!(it.next_doc().is_err());
    }

    #[test]
    fn backwards_advance_is_a_violation() {
        let bits: Arc<dyn Bits> = Arc::new(FixedBitSet::full(10));
        let mut it = AssertingDocIterator::new(Box::new(LiveDocsIterator::new(bits)), 10);
        assert_eq!(it.advance(5).unwrap(), 5);
        assert!(matches!(
            it.advance(5),
            Err(CoreError::ContractViolation { .. })
        ));
    }

    #[test]
    fn non_monotonic_inner_is_caught() {
        let mut it = AssertingDocIterator::new(Box::new(Scripted(vec![1, 4, 3])), 10);
        assert_eq!(it.next_doc().unwrap(), 1);
        assert_eq!(it.next_doc().unwrap(), 4);
        assert!(it.next_doc().is_err());

        let mut it = AssertingDocIterator::new(Box::new(Scripted(vec![12])), 10);
        assert!(it.next_doc().is_err());

        let mut it = AssertingDocIterator::new(Box::new(Scripted(vec![2])), 10);
        assert!(it.advance(6).is_err());
    }

    #[test]
    fn inconsistent_live_docs_rejected_at_construction() {
        struct Lying(Arc<dyn LeafReader>);

        impl LeafReader for Lying {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn max_doc(&self) -> u32 {
                self.0.max_doc()
            }
            fn num_docs(&self) -> u32 {
                self.0.max_doc()
            }
            fn live_docs(&self) -> Option<Arc<dyn Bits>> {
                self.0.live_docs()
            }
            fn core_cache_key(&self) -> &CacheKey {
                self.0.core_cache_key()
            }
            fn reader_cache_key(&self) -> &CacheKey {
                self.0.reader_cache_key()
            }
            fn field_names(&self) -> &[String] {
                self.0.field_names()
            }
            fn stored_fields_reader(&self) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
                self.0.stored_fields_reader()
            }
            fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
                self.0.norms_reader()
            }
            fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
                self.0.doc_values_reader()
            }
            fn close(&self) -> CoreResult<()> {
                Ok(())
            }
        }

        let lying: Arc<dyn LeafReader> = Arc::new(Lying(reader_with_deletes()));
        assert!(matches!(
            AssertingLeafReader::new(lying),
            Err(CoreError::ContractViolation { .. })
        ));
    }
}
