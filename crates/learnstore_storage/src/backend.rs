//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// An opaque, append-oriented byte store.
///
/// The journal above this trait owns all framing. A backend only has to
/// guarantee that bytes handed to [`append`](Self::append) come back
/// unchanged from [`read_at`](Self::read_at), and that
/// [`replace`](Self::replace) swaps the whole content in one step as far
/// as later readers can tell.
///
/// # Invariants
///
/// - `append` returns the offset the data starts at, which equals the
///   size before the call
/// - `size` is the offset of the next `append`
/// - after `sync` returns, every appended byte survives a process exit
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the range is not fully
    /// stored, or an I/O error from the underlying medium.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or exceeds a quota.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Discards everything after `new_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the current size or
    /// the medium rejects the truncation.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the entire content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            StorageError::Corrupted(format!("storage of {size} bytes does not fit in memory"))
        })?;
        self.read_at(0, len)
    }

    /// Replaces the entire content with `data`.
    ///
    /// The default implementation truncates and appends. Backends that can
    /// swap content atomically should override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be replaced.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }
}
