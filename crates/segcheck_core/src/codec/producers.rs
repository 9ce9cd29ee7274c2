//! Per-segment format readers.
//!
//! Producers may keep positioned-read state and are not required to be safe
//! for concurrent use by several merge threads. `merge_instance` hands a
//! merge thread its own reader: an independent clone, the same instance if
//! the producer is stateless, or `None` if the segment lacks the data.

use crate::error::CoreResult;
use crate::types::DocId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stored fields of one document, keyed by field name.
pub type StoredDocument = BTreeMap<String, Vec<u8>>;

/// Reads stored fields.
pub trait StoredFieldsReader: Send + Sync {
    /// Loads the stored fields of `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of bounds or the read fails.
    fn document(&self, doc: DocId) -> CoreResult<StoredDocument>;

    /// Verifies checksums of the underlying files.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::CorruptIndex`] on mismatch.
    fn check_integrity(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Returns a reader for exclusive use by one merge thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone cannot be opened.
    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn StoredFieldsReader>>>;

    /// Releases resources held by this reader.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource fails to release.
    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Reads per-field, per-document normalization values.
pub trait NormsProducer: Send + Sync {
    /// Norm of `field` for `doc`, `None` if the field has no norms.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of bounds or the read fails.
    fn norm(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>>;

    /// Verifies checksums of the underlying files.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::CorruptIndex`] on mismatch.
    fn check_integrity(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Returns a producer for exclusive use by one merge thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone cannot be opened.
    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn NormsProducer>>>;

    /// Releases resources held by this producer.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource fails to release.
    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Reads column-stride per-document values.
pub trait DocValuesProducer: Send + Sync {
    /// Numeric value of `field` for `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of bounds or the read fails.
    fn numeric(&self, field: &str, doc: DocId) -> CoreResult<Option<i64>>;

    /// Binary value of `field` for `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if `doc` is out of bounds or the read fails.
    fn binary(&self, field: &str, doc: DocId) -> CoreResult<Option<Vec<u8>>>;

    /// Verifies checksums of the underlying files.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::CorruptIndex`] on mismatch.
    fn check_integrity(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Returns a producer for exclusive use by one merge thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone cannot be opened.
    fn merge_instance(self: Arc<Self>) -> CoreResult<Option<Arc<dyn DocValuesProducer>>>;

    /// Releases resources held by this producer.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource fails to release.
    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Returns `true` if both handles point at the same object.
///
/// Compares data pointers only; vtable pointers of one object may differ
/// across codegen units.
#[must_use]
pub fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
