//! In-memory format producers.
//!
//! Used by tests, benches and tooling that need a realistic segment without
//! going through the full write path. Each producer kind reports to a
//! [`ProducerStats`] so callers can check how many merge instances were
//! opened and closed.

use crate::codec::producers::{DocValuesProducer, NormsProducer, StoredDocument, StoredFieldsReader};
use crate::error::{CoreError, CoreResult};
use crate::segment::SegmentProducers;
use crate::types::DocId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle counters shared by a producer and all of its merge instances.
#[derive(Debug, Default)]
pub struct ProducerStats {
    opened: AtomicUsize,
    merge_instances: AtomicUsize,
    closed: AtomicUsize,
}

impl ProducerStats {
    /// Instances opened, including the original.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Calls to `merge_instance`.
    #[must_use]
    pub fn merge_instances(&self) -> usize {
        self.merge_instances.load(Ordering::SeqCst)
    }

    /// Instances closed.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn record_merge_instance(&self) {
        self.merge_instances.fetch_add(1, Ordering::SeqCst);
    }

    fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stats for each producer kind of a [`MemorySegmentBuilder`] segment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    /// Stored fields.
    pub stored: Arc<ProducerStats>,
    /// Norms.
    pub norms: Arc<ProducerStats>,
    /// Doc values.
    pub doc_values: Arc<ProducerStats>,
}

fn check_doc(doc: DocId, max_doc: u32) -> CoreResult<()> {
    if doc >= max_doc {
        return Err(CoreError::DocOutOfBounds { doc, max_doc });
    }
    Ok(())
}

/// Stored fields held in memory.
///
/// Tracks the last document read, like a positioned file reader would, so
/// merge instances are independent clones.
#[derive(Debug)]
pub struct MemoryStoredFields {
    docs: Arc<Vec<StoredDocument>>,
    position: Mutex<Option<DocId>>,
    closed: AtomicBool,
    stats: Arc<ProducerStats>,
}

impl MemoryStoredFields {
    fn open(docs: Arc<Vec<StoredDocument>>, stats: Arc<ProducerStats>) -> Self {
        stats.record_open();
        Self {
            docs,
            position: Mutex::new(None),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    /// Last document read through this instance.
    #[must_use]
    pub fn position(&self) -> Option<DocId> {
        *self.position.lock()
    }

    /// Returns `true` once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl StoredFieldsReader for MemoryStoredFields {
    fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        if self.is_closed() {
            return Err(CoreError::already_closed("stored fields reader"));
        }
        check_doc(doc, self.docs.len() as u32)?;
        *self.position.lock() = Some(doc);
        Ok(self.docs[doc as usize].clone())
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
        self.stats.record_merge_instance();
        Ok(Some(Arc::new(Self::open(
            Arc::clone(&self.docs),
            Arc::clone(&self.stats),
        ))))
    }

    fn close(&self) -> CoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.record_close();
        }
        Ok(())
    }
}

/// Norms held in memory. Stateless, so it is its own merge instance.
#[derive(Debug)]
pub struct MemoryNorms {
    max_doc: u32,
    norms: HashMap<String, BTreeMap<DocId, i64>>,
    closed: AtomicBool,
    stats: Arc<ProducerStats>,
}

impl NormsProducer for MemoryNorms {
    fn norm(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::already_closed("norms producer"));
        }
        check_doc(doc, self.max_doc)?;
        Ok(self.norms.get(field).map(|f| f.get(&doc).copied().unwrap_or(0)))
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        self.stats.record_merge_instance();
        Ok(Some(self))
    }

    fn close(&self) -> CoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.record_close();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DocValuesData {
    numeric: HashMap<String, BTreeMap<DocId, i64>>,
    binary: HashMap<String, BTreeMap<DocId, Vec<u8>>>,
}

/// Doc values held in memory.
#[derive(Debug)]
pub struct MemoryDocValues {
    max_doc: u32,
    data: Arc<DocValuesData>,
    closed: AtomicBool,
    stats: Arc<ProducerStats>,
}

impl MemoryDocValues {
    fn open(max_doc: u32, data: Arc<DocValuesData>, stats: Arc<ProducerStats>) -> Self {
        stats.record_open();
        Self {
            max_doc,
            data,
            closed: AtomicBool::new(false),
            stats,
        }
    }

    fn ensure_open(&self, doc: DocId) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::already_closed("doc values producer"));
        }
        check_doc(doc, self.max_doc)
    }
}

impl DocValuesProducer for MemoryDocValues {
    fn numeric(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        self.ensure_open(doc)?;
        Ok(self.data.numeric.get(field).and_then(|f| f.get(&doc).copied()))
    }

    fn binary(&self, field: &str, doc: DocId) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_open(doc)?;
        Ok(self.data.binary.get(field).and_then(|f| f.get(&doc).cloned()))
    }

    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        self.stats.record_merge_instance();
        Ok(Some(Arc::new(Self::open(
            self.max_doc,
            Arc::clone(&self.data),
            Arc::clone(&self.stats),
        ))))
    }

    fn close(&self) -> CoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.record_close();
        }
        Ok(())
    }
}

/// Builds the producers of an in-memory segment.
///
/// Norms and doc values are only present if at least one value was added.
///
/// # Example
///
/// ```rust
/// use segcheck_core::codec::MemorySegmentBuilder;
///
/// let (producers, stats) = MemorySegmentBuilder::new(2)
///     .stored(0, "title", b"hello")
///     .norm("title", 0, 3)
///     .build();
/// assert!(producers.norms.is_some());
/// assert!(producers.doc_values.is_none());
/// assert_eq!(stats.stored.opened(), 1);
/// ```
#[derive(Debug)]
pub struct MemorySegmentBuilder {
    max_doc: u32,
    docs: Vec<StoredDocument>,
    norms: HashMap<String, BTreeMap<DocId, i64>>,
    doc_values: DocValuesData,
}

impl MemorySegmentBuilder {
    /// Starts a segment of `max_doc` empty documents.
    #[must_use]
    pub fn new(max_doc: u32) -> Self {
        Self {
            max_doc,
            docs: vec![StoredDocument::new(); max_doc as usize],
            norms: HashMap::new(),
            doc_values: DocValuesData::default(),
        }
    }

    /// Adds a stored field value.
    ///
    /// # Panics
    ///
    /// Panics if `doc >= max_doc`.
    #[must_use]
    pub fn stored(mut self, doc: DocId, field: &str, value: &[u8]) -> Self {
        self.docs[doc as usize].insert(field.to_string(), value.to_vec());
        self
    }

    /// Adds a norm.
    #[must_use]
    pub fn norm(mut self, field: &str, doc: DocId, value: i64) -> Self {
        self.norms.entry(field.to_string()).or_default().insert(doc, value);
        self
    }

    /// Adds a numeric doc value.
    #[must_use]
    pub fn numeric(mut self, field: &str, doc: DocId, value: i64) -> Self {
        self.doc_values
            .numeric
            .entry(field.to_string())
            .or_default()
            .insert(doc, value);
        self
    }

    /// Adds a binary doc value.
    #[must_use]
    pub fn binary(mut self, field: &str, doc: DocId, value: &[u8]) -> Self {
        self.doc_values
            .binary
            .entry(field.to_string())
            .or_default()
            .insert(doc, value.to_vec());
        self
    }

    /// Builds the producers together with their stats.
    #[must_use]
    pub fn build(self) -> (SegmentProducers, MemoryStats) {
        let stats = MemoryStats::default();

        let mut field_names: BTreeSet<String> = self
            .docs
            .iter()
            .flat_map(|doc| doc.keys().cloned())
            .collect();
        field_names.extend(self.norms.keys().cloned());
        field_names.extend(self.doc_values.numeric.keys().cloned());
        field_names.extend(self.doc_values.binary.keys().cloned());

        let stored: Arc<dyn StoredFieldsReader> = Arc::new(MemoryStoredFields::open(
            Arc::new(self.docs),
            Arc::clone(&stats.stored),
        ));

        let norms = if self.norms.is_empty() {
            None
        } else {
            stats.norms.record_open();
            Some(Arc::new(MemoryNorms {
                max_doc: self.max_doc,
                norms: self.norms,
                closed: AtomicBool::new(false),
                stats: Arc::clone(&stats.norms),
            }) as Arc<dyn NormsProducer>)
        };

        let has_doc_values =
            !self.doc_values.numeric.is_empty() || !self.doc_values.binary.is_empty();
        let doc_values = has_doc_values.then(|| {
            Arc::new(MemoryDocValues::open(
                self.max_doc,
                Arc::new(self.doc_values),
                Arc::clone(&stats.doc_values),
            )) as Arc<dyn DocValuesProducer>
        });

        (
            SegmentProducers {
                field_names: field_names.into_iter().collect(),
                stored: Some(stored),
                norms,
                doc_values,
            },
            stats,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::producers::same_instance;

    fn segment() -> (SegmentProducers, MemoryStats) {
        MemorySegmentBuilder::new(3)
            .stored(0, "title", b"a")
            .stored(2, "body", b"c")
            .norm("title", 0, 7)
            .numeric("rank", 1, 42)
            .binary("tag", 2, b"x")
            .build()
    }

    #[test]
    fn field_names_are_sorted_union() {
        let (producers, _) = segment();
        assert_eq!(producers.field_names, vec!["body", "rank", "tag", "title"]);
    }

    #[test]
    fn stored_merge_instance_is_independent_clone() {
        let (producers, stats) = segment();
        let original = producers.stored.expect("stored");
        let clone = Arc::clone(&original)
            .merge_instance()
            .unwrap()
            .expect("clone");
        assert!(!same_instance(&original, &clone));
        assert_eq!(stats.stored.opened(), 2);
        assert_eq!(stats.stored.merge_instances(), 1);

        assert_eq!(clone.document(2).unwrap()["body"], b"c".to_vec());
        clone.close().unwrap();
        clone.close().unwrap();
        assert_eq!(stats.stored.closed(), 1);
        assert!(original.document(0).is_ok());
    }

    #[test]
    fn norms_merge_instance_is_self() {
        let (producers, stats) = segment();
        let norms = producers.norms.expect("norms");
        let instance = Arc::clone(&norms).merge_instance().unwrap().expect("self");
        assert!(same_instance(&norms, &instance));
        assert_eq!(stats.norms.opened(), 1);
        assert_eq!(norms.norm("title", 0).unwrap(), Some(7));
        assert_eq!(norms.norm("title", 1).unwrap(), Some(0));
        assert_eq!(norms.norm("body", 1).unwrap(), None);
    }

    #[test]
    fn doc_values_lookup_and_bounds() {
        let (producers, _) = segment();
        let dv = producers.doc_values.expect("doc values");
        assert_eq!(dv.numeric("rank", 1).unwrap(), Some(42));
        assert_eq!(dv.numeric("rank", 0).unwrap(), None);
        assert_eq!(dv.binary("tag", 2).unwrap(), Some(b"x".to_vec()));
        assert!(matches!(
            dv.numeric("rank", 3),
            Err(CoreError::DocOutOfBounds { doc: 3, max_doc: 3 })
        ));
    }

    #[test]
    fn absent_features_are_none() {
        let (producers, stats) = MemorySegmentBuilder::new(1).build();
        assert!(producers.stored.is_some());
        assert!(producers.norms.is_none());
        assert!(producers.doc_values.is_none());
        assert_eq!(stats.norms.opened(), 0);
    }

    #[test]
    fn closed_reader_rejects_reads() {
        let (producers, _) = segment();
        let stored = producers.stored.expect("stored");
        stored.close().unwrap();
        assert!(matches!(
            stored.document(0),
            Err(CoreError::AlreadyClosed { .. })
        ));
    }
}
