//! Conformance run configuration.

use crate::error::{HarnessError, HarnessResult};
use segcheck_core::MAX_DOCS;
use std::env;

/// Environment variable enabling the expensive overflow probe.
pub const ENV_EXPENSIVE: &str = "SEGCHECK_EXPENSIVE";
/// Environment variable fixing the random seed.
pub const ENV_SEED: &str = "SEGCHECK_SEED";
/// Environment variable overriding the engine's document limit.
pub const ENV_MAX_DOCS: &str = "SEGCHECK_MAX_DOCS";

/// Configuration for a live-docs conformance run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceConfig {
    /// Number of random trials.
    pub random_trials: usize,
    /// Smallest `max_docs` of a random trial.
    pub min_docs: u32,
    /// Largest `max_docs` of a random trial.
    pub max_docs: u32,
    /// Whether to run the overflow probe at the document limit.
    pub expensive: bool,
    /// The storage engine's document limit. The overflow probe runs here.
    pub max_docs_limit: u32,
    /// Seed for every random choice; drawn at random when `None`.
    pub seed: Option<u64>,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        Self {
            random_trials: 50,
            min_docs: 3,
            max_docs: 1000,
            expensive: false,
            max_docs_limit: MAX_DOCS,
            seed: None,
        }
    }
}

impl ConformanceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SEGCHECK_EXPENSIVE`, `SEGCHECK_SEED` and
    /// `SEGCHECK_MAX_DOCS`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> HarnessResult<Self> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if a value is unparsable.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HarnessResult<Self> {
        if let Some(value) = lookup(ENV_EXPENSIVE) {
            self.expensive = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "" | "0" | "false" | "no" | "off" => false,
                _ => return Err(HarnessError::config(ENV_EXPENSIVE, value)),
            };
        }
        if let Some(value) = lookup(ENV_SEED) {
            let seed = value
                .trim()
                .parse()
                .map_err(|_| HarnessError::config(ENV_SEED, &value))?;
            self.seed = Some(seed);
        }
        if let Some(value) = lookup(ENV_MAX_DOCS) {
            self.max_docs_limit = value
                .trim()
                .parse()
                .map_err(|_| HarnessError::config(ENV_MAX_DOCS, &value))?;
        }
        Ok(self)
    }

    /// Sets the number of random trials.
    #[must_use]
    pub const fn random_trials(mut self, trials: usize) -> Self {
        self.random_trials = trials;
        self
    }

    /// Sets the `max_docs` range of random trials.
    #[must_use]
    pub const fn doc_range(mut self, min_docs: u32, max_docs: u32) -> Self {
        self.min_docs = min_docs;
        self.max_docs = max_docs;
        self
    }

    /// Enables or disables the overflow probe.
    #[must_use]
    pub const fn expensive(mut self, value: bool) -> Self {
        self.expensive = value;
        self
    }

    /// Sets the engine's document limit.
    #[must_use]
    pub const fn max_docs_limit(mut self, limit: u32) -> Self {
        self.max_docs_limit = limit;
        self
    }

    /// Fixes the seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks that the ranges are usable.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidTrial`] describing the first problem.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.min_docs < 3 {
            return Err(HarnessError::invalid_trial(format!(
                "min_docs must be at least 3, got {}",
                self.min_docs
            )));
        }
        if self.min_docs > self.max_docs {
            return Err(HarnessError::invalid_trial(format!(
                "min_docs {} exceeds max_docs {}",
                self.min_docs, self.max_docs
            )));
        }
        if self.max_docs_limit > MAX_DOCS {
            return Err(HarnessError::invalid_trial(format!(
                "max_docs_limit {} exceeds the segment limit {MAX_DOCS}",
                self.max_docs_limit
            )));
        }
        if self.max_docs > self.max_docs_limit {
            return Err(HarnessError::invalid_trial(format!(
                "max_docs {} exceeds max_docs_limit {}",
                self.max_docs, self.max_docs_limit
            )));
        }
        Ok(())
    }
}
