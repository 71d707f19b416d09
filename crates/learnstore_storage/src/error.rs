//! Storage error types.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system rejected an I/O request.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read went beyond the bytes currently stored.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Bytes currently stored.
        size: u64,
    },

    /// The backend refused a write because it would exceed its quota.
    #[error("storage quota exceeded: {requested} bytes requested, limit is {limit}")]
    QuotaExceeded {
        /// Size the store would have after the write.
        requested: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// The stored bytes are not usable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The backend has been closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the write was refused for lack of space.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
