use crate::bits::Bits;
use crate::codec::{DocValuesProducer, NormsProducer, StoredFieldsReader};
use crate::error::CoreResult;
use crate::reader::LeafReader;
use crate::types::CacheKey;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A leaf reader that presents a different identity and field order than
/// the reader it wraps.
///
/// Every wrap gets a fresh reader cache key and a seeded permutation of the
/// field names. Content is unchanged. Callers that cache by reader key or
/// assume field order is stable across reopen break under this wrapper.
pub struct MismatchedLeafReader {
    inner: Arc<dyn LeafReader>,
    reader_key: CacheKey,
    field_names: Vec<String>,
}

impl MismatchedLeafReader {
    /// Wraps `inner`, shuffling its field names with `seed`.
    #[must_use]
    pub fn new(inner: Arc<dyn LeafReader>, seed: u64) -> Self {
        let mut field_names = inner.field_names().to_vec();
        field_names.shuffle(&mut StdRng::seed_from_u64(seed));
        let reader_key = CacheKey::new(format!(
            "{}~{}",
            inner.reader_cache_key(),
            Uuid::new_v4().simple()
        ));
        Self {
            inner,
            reader_key,
            field_names,
        }
    }

    /// The wrapped reader.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn LeafReader> {
        &self.inner
    }
}

impl fmt::Debug for MismatchedLeafReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MismatchedLeafReader")
            .field("segment", &self.inner.name())
            .field("reader_key", &self.reader_key)
            .field("field_names", &self.field_names)
            .finish()
    }
}

impl LeafReader for MismatchedLeafReader {
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
        &self.reader_key
    }

    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn stored_fields_reader(&self) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>> {
        self.inner.stored_fields_reader()
    }

    fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>> {
        self.inner.norms_reader()
    }

    fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>> {
        self.inner.doc_values_reader()
    }

    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemorySegmentBuilder;
    use crate::segment::SegmentReader;
    use crate::types::{SegmentDescriptor, SegmentId};

    fn reader() -> Arc<dyn LeafReader> {
        let mut builder = MemorySegmentBuilder::new(2);
        for field in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            builder = builder.stored(0, field, field.as_bytes());
        }
        let (producers, _) = builder.build();
        let descriptor = SegmentDescriptor::new("_2", SegmentId::random(), 2).unwrap();
        Arc::new(SegmentReader::new(descriptor, producers, None).unwrap())
    }

    #[test]
    fn identity_changes_on_every_wrap() {
        let inner = reader();
        let a = MismatchedLeafReader::new(Arc::clone(&inner), 1);
        let b = MismatchedLeafReader::new(Arc::clone(&inner), 1);
        assert_ne!(a.reader_cache_key(), inner.reader_cache_key());
        assert_ne!(a.reader_cache_key(), b.reader_cache_key());
        assert_eq!(a.core_cache_key(), inner.core_cache_key());
    }

    #[test]
    fn field_order_is_a_seeded_permutation() {
        let inner = reader();
        let a = MismatchedLeafReader::new(Arc::clone(&inner), 7);
        let b = MismatchedLeafReader::new(Arc::clone(&inner), 7);
        assert_eq!(a.field_names(), b.field_names());

        let mut sorted = a.field_names().to_vec();
        sorted.sort();
        assert_eq!(sorted, inner.field_names());
    }

    #[test]
    fn content_is_unchanged() {
        let inner = reader();
        let wrapped = MismatchedLeafReader::new(Arc::clone(&inner), 3);
        assert_eq!(wrapped.document(0).unwrap(), inner.document(0).unwrap());
        assert_eq!(wrapped.num_docs(), 2);
    }
}
