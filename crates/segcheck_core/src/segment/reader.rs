use crate::bits::{cardinality, Bits};
use crate::codec::{Codec, DocValuesProducer, NormsProducer, StoredFieldsReader};
use crate::error::{CoreError, CoreResult};
use crate::reader::LeafReader;
use crate::types::{CacheKey, SegmentDescriptor};
use segcheck_storage::{Directory, IoContext};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The format producers of one segment.
///
/// A missing producer means the segment has no data for that format.
#[derive(Clone, Default)]
pub struct SegmentProducers {
    /// Fields present in the segment, sorted.
    pub field_names: Vec<String>,
    /// Stored fields.
    pub stored: Option<Arc<dyn StoredFieldsReader>>,
    /// Norms.
    pub norms: Option<Arc<dyn NormsProducer>>,
    /// Doc values.
    pub doc_values: Option<Arc<dyn DocValuesProducer>>,
}

impl fmt::Debug for SegmentProducers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentProducers")
            .field("field_names", &self.field_names)
            .field("stored", &self.stored.is_some())
            .field("norms", &self.norms.is_some())
            .field("doc_values", &self.doc_values.is_some())
            .finish()
    }
}

/// Immutable view over one segment.
///
/// Owns the segment's producers; wrappers borrow it through an `Arc`.
pub struct SegmentReader {
    descriptor: SegmentDescriptor,
    producers: SegmentProducers,
    live_docs: Option<Arc<dyn Bits>>,
    core_key: CacheKey,
    reader_key: CacheKey,
}

impl SegmentReader {
    /// Creates a reader from already loaded parts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptIndex`] if the live docs disagree with the
    /// descriptor's length or delete count.
    pub fn new(
        descriptor: SegmentDescriptor,
        producers: SegmentProducers,
        live_docs: Option<Arc<dyn Bits>>,
    ) -> CoreResult<Self> {
        match &live_docs {
            Some(bits) => {
                let live = cardinality(bits.as_ref());
                if bits.len() != descriptor.max_docs()
                    || live != u64::from(descriptor.num_live_docs())
                {
                    return Err(CoreError::corrupt(
                        descriptor.name(),
                        format!(
                            "live docs have length {} and {live} live, descriptor expects {} and {}",
                            bits.len(),
                            descriptor.max_docs(),
                            descriptor.num_live_docs()
                        ),
                    ));
                }
            }
            None if descriptor.del_count() > 0 => {
                return Err(CoreError::corrupt(
                    descriptor.name(),
                    format!("{} deletions but no live docs", descriptor.del_count()),
                ));
            }
            None => {}
        }

        Ok(Self {
            core_key: CacheKey::for_core(&descriptor),
            reader_key: CacheKey::for_reader(&descriptor),
            descriptor,
            producers,
            live_docs,
        })
    }

    /// Opens a segment, loading live docs through `codec` if the descriptor
    /// has a delete generation.
    ///
    /// # Errors
    ///
    /// Returns the codec's error if the live docs cannot be read.
    pub fn open(
        dir: &dyn Directory,
        descriptor: SegmentDescriptor,
        codec: &dyn Codec,
        producers: SegmentProducers,
        ctx: &IoContext,
    ) -> CoreResult<Self> {
        let live_docs = if descriptor.has_deletions() {
            Some(codec.live_docs_format().read_live_docs(dir, &descriptor, ctx)?)
        } else {
            None
        };
        debug!(
            segment = %descriptor,
            codec = codec.name(),
            deletions = descriptor.del_count(),
            "opened segment reader"
        );
        Self::new(descriptor, producers, live_docs)
    }

    /// The descriptor this reader was opened with.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// The segment's producers.
    #[must_use]
    pub fn producers(&self) -> &SegmentProducers {
        &self.producers
    }
}

impl fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentReader")
            .field("descriptor", &self.descriptor)
            .field("producers", &self.producers)
            .finish_non_exhaustive()
    }
}

impl LeafReader for SegmentReader {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn max_doc(&self) -> u32 {
        self.descriptor.max_docs()
    }

    fn num_docs(&self) -> u32 {
        self.descriptor.num_live_docs()
    }

    fn live_docs(&self) -> Option<Arc<dyn Bits>> {
        self.live_docs.clone()
    }

    fn core_cache_key(&self) -> &CacheKey {
        &self.core_key
    }

    fn reader_cache_key(&self) -> &CacheKey {
        &self.reader_key
    }

    fn field_names(&self) -> &[String] {
        &self.producers.field_names
    }

    fn stored_fields_reader(&self) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
        Ok(self.producers.stored.clone())
    }

    fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        Ok(self.producers.norms.clone())
    }

    fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        Ok(self.producers.doc_values.clone())
    }

    fn close(&self) -> CoreResult<()> {
        let mut failures = Vec::new();
        if let Some(stored) = &self.producers.stored {
            failures.extend(stored.close().err());
        }
        if let Some(norms) = &self.producers.norms {
            failures.extend(norms.close().err());
        }
        if let Some(dv) = &self.producers.doc_values {
            failures.extend(dv.close().err());
        }
        CoreError::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{DocIterator, FixedBitSet, NO_MORE_DOCS};
    use crate::codec::{DefaultCodec, MemorySegmentBuilder};
    use crate::types::SegmentId;
    use segcheck_storage::RamDirectory;

    fn descriptor(max_docs: u32) -> SegmentDescriptor {
        SegmentDescriptor::new("_3", SegmentId::random(), max_docs).unwrap()
    }

    #[test]
    fn open_without_deletions() {
        let dir = RamDirectory::new();
        let (producers, _) = MemorySegmentBuilder::new(4).stored(1, "f", b"v").build();
        let reader = SegmentReader::open(
            &dir,
            descriptor(4),
            &DefaultCodec::default(),
            producers,
            &IoContext::ReadOnce,
        )
        .unwrap();

        assert!(reader.live_docs().is_none());
        assert_eq!(reader.num_docs(), 4);
        assert_eq!(reader.document(1).unwrap()["f"], b"v".to_vec());
        assert!(matches!(
            reader.document(4),
            Err(CoreError::DocOutOfBounds { doc: 4, max_doc: 4 })
        ));
        assert!(reader.norm("f", 0).unwrap().is_none());
    }

    #[test]
    fn open_loads_live_docs() {
        let dir = RamDirectory::new();
        let codec = DefaultCodec::default();
        let base = descriptor(6);

        let mut bits = FixedBitSet::full(6);
        bits.clear(0);
        bits.clear(4);
        codec
            .live_docs_format()
            .write_live_docs(&bits, &dir, &base, 2, &IoContext::Default)
            .unwrap();

        let (producers, _) = MemorySegmentBuilder::new(6).build();
        let reader = SegmentReader::open(
            &dir,
            base.advance_del_gen(2).unwrap(),
            &codec,
            producers,
            &IoContext::ReadOnce,
        )
        .unwrap();

        assert_eq!(reader.num_docs(), 4);
        assert_eq!(reader.core_cache_key(), &CacheKey::for_core(&base));
        assert_ne!(reader.reader_cache_key(), &CacheKey::for_reader(&base));

        let mut it = reader.live_docs_iter();
        let mut docs = Vec::new();
        loop {
            let doc = it.next_doc().unwrap();
            if doc == NO_MORE_DOCS {
                break;
            }
            docs.push(doc);
        }
        assert_eq!(docs, vec![1, 2, 3, 5]);
    }

    #[test]
    fn new_rejects_mismatched_live_docs() {
        let desc = descriptor(8).with_deletes(1, 1).unwrap();
        let bits: Arc<dyn Bits> = Arc::new(FixedBitSet::full(8));
        let (producers, _) = MemorySegmentBuilder::new(8).build();
        assert!(matches!(
            SegmentReader::new(desc.clone(), producers.clone(), Some(bits)),
            Err(CoreError::CorruptIndex { .. })
        ));
        assert!(matches!(
            SegmentReader::new(desc, producers, None),
            Err(CoreError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn close_closes_producers() {
        let (producers, stats) = MemorySegmentBuilder::new(2)
            .norm("f", 0, 1)
            .numeric("n", 1, 2)
            .build();
        let reader = SegmentReader::new(descriptor(2), producers, None).unwrap();
        reader.close().unwrap();
        assert_eq!(stats.stored.closed(), 1);
        assert_eq!(stats.norms.closed(), 1);
        assert_eq!(stats.doc_values.closed(), 1);
    }
}
