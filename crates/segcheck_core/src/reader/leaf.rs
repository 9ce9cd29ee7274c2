//! Single-segment reader capability.

use crate::bits::{Bits, DocIterator, LiveDocsIterator, MatchAllBits};
use crate::codec::{DocValuesProducer, NormsProducer, StoredDocument, StoredFieldsReader};
use crate::error::{CoreError, CoreResult};
use crate::types::{CacheKey, DocId};
use std::sync::Arc;

/// A reader over exactly one segment.
///
/// Wrappers implement this by holding an inner `Arc<dyn LeafReader>` and
/// overriding only what they change. The data accessors have default
/// implementations routed through the producer accessors, so a wrapper that
/// swaps producers changes every read path at once.
pub trait LeafReader: Send + Sync {
    /// Segment name.
    fn name(&self) -> &str;

    /// One greater than the largest document id.
    fn max_doc(&self) -> u32;

    /// Number of live documents.
    fn num_docs(&self) -> u32;

    /// Returns `true` if some documents are deleted.
    fn has_deletions(&self) -> bool {
        self.num_docs() < self.max_doc()
    }

    /// Live docs, `None` if nothing is deleted.
    fn live_docs(&self) -> Option<Arc<dyn Bits>>;

    /// Key shared by every reader over the same segment core.
    fn core_cache_key(&self) -> &CacheKey;

    /// Key identifying this reader's view, including its deletions.
    fn reader_cache_key(&self) -> &CacheKey;

    /// Names of the fields present in the segment.
    fn field_names(&self) -> &[String];

    /// Stored fields reader, `None` if the segment has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be obtained.
    fn stored_fields_reader(&self) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>>;

    /// Norms producer, `None` if the segment has no norms.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be obtained.
    fn norms_reader(&self) -> CoreResult<Option<Arc<dyn NormsProducer>>>;

    /// Doc values producer, `None` if the segment has no doc values.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be obtained.
    fn doc_values_reader(&self) -> CoreResult<Option<Arc<dyn DocValuesProducer>>>;

    /// Loads the stored fields of `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`], [`CoreError::FeatureAbsent`]
    /// if the segment stores no fields, or the producer's error.
    fn document(&self, doc: DocId) -> CoreResult<StoredDocument> {
        check_doc(self, doc)?;
        let reader = self
            .stored_fields_reader()?
            .ok_or_else(|| CoreError::FeatureAbsent {
                feature: "stored fields",
                segment: self.name().to_string(),
            })?;
        reader.document(doc)
    }

    /// Norm of `field` for `doc`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] or the producer's error.
    fn norm(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        check_doc(self, doc)?;
        match self.norms_reader()? {
            Some(norms) => norms.norm(field, doc),
            None => Ok(None),
        }
    }

    /// Numeric doc value of `field` for `doc`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] or the producer's error.
    fn numeric_doc_value(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>> {
        check_doc(self, doc)?;
        match self.doc_values_reader()? {
            Some(dv) => dv.numeric(field, doc),
            None => Ok(None),
        }
    }

    /// Binary doc value of `field` for `doc`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocOutOfBounds`] or the producer's error.
    fn binary_doc_value(&self, field: &str, doc: DocId) -> CoreResult<Option<Vec<u8>>> {
        check_doc(self, doc)?;
        match self.doc_values_reader()? {
            Some(dv) => dv.binary(field, doc),
            None => Ok(None),
        }
    }

    /// Iterates live documents in ascending order.
    fn live_docs_iter(&self) -> Box<dyn DocIterator> {
        let bits = self
            .live_docs()
            .unwrap_or_else(|| Arc::new(MatchAllBits::new(self.max_doc())));
        Box::new(LiveDocsIterator::new(bits))
    }

    /// Releases resources owned by this reader.
    ///
    /// Wrappers release only what they created, never the wrapped reader.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CloseFailed`] if any release failed.
    fn close(&self) -> CoreResult<()>;
}

fn check_doc<R: LeafReader + ?Sized>(reader: &R, doc: DocId) -> CoreResult<()> {
    if doc >= reader.max_doc() {
        return Err(CoreError::DocOutOfBounds {
            doc,
            max_doc: reader.max_doc(),
        });
    }
    Ok(())
}
