//! Error types for the conformance harness.

use segcheck_core::CoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// How a trial exposed its liveness pattern to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BitsRepresentation {
    /// A concrete `FixedBitSet`.
    FixedBitSet,
    /// An opaque index predicate.
    Predicate,
}

impl BitsRepresentation {
    /// Both representations.
    pub const ALL: [Self; 2] = [Self::FixedBitSet, Self::Predicate];

    /// Short name for reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FixedBitSet => "fixed_bit_set",
            Self::Predicate => "predicate",
        }
    }
}

impl fmt::Display for BitsRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a trial an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    /// Persisting the live docs.
    Write,
    /// Reopening the live docs.
    Read,
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Read => "read",
        })
    }
}

/// Everything needed to rerun one trial deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialContext {
    /// Codec under test.
    pub codec: String,
    /// Hex segment id.
    pub segment_id: String,
    /// Declared document count.
    pub max_docs: u32,
    /// Live documents in the pattern.
    pub num_live_docs: u32,
    /// Representation handed to the writer.
    pub representation: BitsRepresentation,
    /// Seed of the run.
    pub seed: u64,
    /// Index of the trial within the run.
    pub trial: usize,
}

impl fmt::Display for TrialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "codec={} segment={} max_docs={} num_live_docs={} representation={} seed={} trial={}",
            self.codec,
            self.segment_id,
            self.max_docs,
            self.num_live_docs,
            self.representation,
            self.seed,
            self.trial
        )
    }
}

/// Errors raised by the conformance harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Storage I/O failed. The trial is stopped, not retried.
    #[error("storage I/O failed during {phase} [{context}]: {source}")]
    Storage {
        /// Where the failure happened.
        phase: TrialPhase,
        /// The failing trial.
        context: TrialContext,
        /// The underlying error.
        #[source]
        source: CoreError,
    },

    /// The codec rejected its input or its own output.
    #[error("codec failed during {phase} [{context}]: {source}")]
    Codec {
        /// Where the failure happened.
        phase: TrialPhase,
        /// The failing trial.
        context: TrialContext,
        /// The underlying error.
        #[source]
        source: CoreError,
    },

    /// The bits read back differ from the bits written.
    #[error("round trip mismatch [{context}]: {message}")]
    Mismatch {
        /// The failing trial.
        context: TrialContext,
        /// First difference found.
        message: String,
    },

    /// Trial parameters are out of range.
    #[error("invalid trial: {message}")]
    InvalidTrial {
        /// What is wrong.
        message: String,
    },

    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    Config {
        /// The configuration key.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl HarnessError {
    /// Wraps a core error raised during `phase`, separating storage failures
    /// from codec failures.
    pub fn from_core(phase: TrialPhase, context: TrialContext, source: CoreError) -> Self {
        if source.is_storage() {
            Self::Storage {
                phase,
                context,
                source,
            }
        } else {
            Self::Codec {
                phase,
                context,
                source,
            }
        }
    }

    /// Creates an invalid trial error.
    pub fn invalid_trial(message: impl Into<String>) -> Self {
        Self::InvalidTrial {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(key: &'static str, value: impl Into<String>) -> Self {
        Self::Config {
            key,
            value: value.into(),
        }
    }

    /// The failing trial, if the error belongs to one.
    #[must_use]
    pub fn context(&self) -> Option<&TrialContext> {
        match self {
            Self::Storage { context, .. }
            | Self::Codec { context, .. }
            | Self::Mismatch { context, .. } => Some(context),
            Self::InvalidTrial { .. } | Self::Config { .. } => None,
        }
    }
}
