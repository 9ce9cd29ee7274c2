//! # segcheck testkit
//!
//! Conformance harness and test utilities for segcheck.
//!
//! This crate provides:
//! - The live-docs round-trip harness ([`LiveDocsHarness`])
//! - Harness configuration with environment overrides
//! - Property-based test generators using proptest
//! - Fault-injecting directories
//! - Fuzz testing harnesses
//! - Stress testing utilities
//! - Directory and reader fixtures
//!
//! ## Usage
//!
//! ```rust
//! use segcheck_core::DefaultCodec;
//! use segcheck_storage::RamDirectory;
//! use segcheck_testkit::prelude::*;
//!
//! let config = ConformanceConfig::default().random_trials(5).seed(42);
//! let mut harness = LiveDocsHarness::new(Box::new(DefaultCodec::default()), config).unwrap();
//! let summary = harness.run_all(&RamDirectory::new()).unwrap();
//! assert_eq!(summary.seed, 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod faulty;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod live_docs;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::live_docs::*;
}

pub use config::*;
pub use error::*;
pub use faulty::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use live_docs::*;
pub use stress::*;
