//! Error types for segcheck core.

use segcheck_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in segcheck core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend or directory error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A persisted file failed validation.
    #[error("corrupt index ({resource}): {message}")]
    CorruptIndex {
        /// File or segment the corruption was found in.
        resource: String,
        /// Description of the corruption.
        message: String,
    },

    /// An argument violated a documented precondition.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated precondition.
        message: String,
    },

    /// A document id was outside `0..max_doc`.
    #[error("doc {doc} out of bounds for max_doc {max_doc}")]
    DocOutOfBounds {
        /// The requested document.
        doc: u32,
        /// The reader's document count.
        max_doc: u32,
    },

    /// A caller or producer broke an API contract checked by an asserting wrapper.
    #[error("contract violation: {message}")]
    ContractViolation {
        /// Description of the violation.
        message: String,
    },

    /// The segment has no data for the requested format.
    #[error("{feature} not present in segment {segment}")]
    FeatureAbsent {
        /// Name of the missing format.
        feature: &'static str,
        /// Segment name.
        segment: String,
    },

    /// The resource was used after close.
    #[error("{what} is closed")]
    AlreadyClosed {
        /// What was closed.
        what: String,
    },

    /// One or more resources failed to release.
    #[error("close failed with {} error(s); first: {}", .failures.len(), first_failure(.failures))]
    CloseFailed {
        /// Every release failure, in the order encountered.
        failures: Vec<CoreError>,
    },
}

fn first_failure(failures: &[CoreError]) -> String {
    failures
        .first()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

impl CoreError {
    /// Creates a corrupt index error.
    pub fn corrupt(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptIndex {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a contract violation error.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Creates an already closed error.
    pub fn already_closed(what: impl Into<String>) -> Self {
        Self::AlreadyClosed { what: what.into() }
    }

    /// Folds release failures into a single result.
    ///
    /// Returns `Ok(())` for an empty list, the lone error for a single
    /// failure, and [`CoreError::CloseFailed`] otherwise.
    pub fn from_failures(mut failures: Vec<CoreError>) -> CoreResult<()> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::CloseFailed { failures }),
        }
    }

    /// Returns `true` if the error originated in the storage layer.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
