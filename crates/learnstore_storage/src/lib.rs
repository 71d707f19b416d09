//! # LearnStore Storage
//!
//! The byte stores that sit underneath the LearnStore journal.
//!
//! Backends know nothing about records, collections or frames. They hold
//! one growing byte sequence and support appending, positional reads,
//! truncation and whole-content replacement (used by compaction).
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and ephemeral stores; clones share bytes
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use learnstore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"frame-1").unwrap();
//! backend.append(b"frame-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"frame-1frame-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
