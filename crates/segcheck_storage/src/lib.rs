//! # segcheck storage
//!
//! Directory and byte-store abstractions for segcheck.
//!
//! This crate provides the lowest-level storage layer the codecs write to.
//! Backends are **opaque byte stores** - they do not interpret the data they
//! store. A [`Directory`] is a flat namespace of write-once files, each backed
//! by a [`StorageBackend`].
//!
//! ## Available Implementations
//!
//! - [`InMemoryBackend`] / [`RamDirectory`] - For tests and ephemeral trials
//! - [`FileBackend`] / [`FsDirectory`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use segcheck_storage::{Directory, IoContext, RamDirectory};
//!
//! let dir = RamDirectory::new();
//! dir.write_file("_0_1.liv", b"hello world", &IoContext::Default).unwrap();
//! let data = dir.read_file("_0_1.liv", &IoContext::ReadOnce).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod directory;
mod error;
mod file;
mod fs;
mod memory;
mod ram;

pub use backend::StorageBackend;
pub use directory::{Directory, IoContext};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use fs::FsDirectory;
pub use memory::InMemoryBackend;
pub use ram::RamDirectory;
