//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A storage backend that keeps its bytes in memory.
///
/// Clones share the same buffer, so a test can hand one clone to an
/// engine, drop the engine, and reopen a new engine on another clone to
/// exercise journal replay without touching the file system.
///
/// An optional byte limit makes `append` fail with
/// [`StorageError::QuotaExceeded`], which is how tests simulate a full
/// device.
///
/// # Example
///
/// ```rust
/// use learnstore_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// let mut writer = backend.clone();
/// writer.append(b"shared").unwrap();
/// assert_eq!(backend.size().unwrap(), 6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    limit: Option<u64>,
}

impl InMemoryBackend {
    /// Creates an empty backend with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            limit: None,
        }
    }

    /// Creates an empty backend that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: u64) -> Self {
        Self {
            data: Arc::default(),
            limit: Some(limit),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).map_err(|_| StorageError::ReadPastEnd {
            offset,
            len,
            size,
        })?;
        let end = start.saturating_add(len);

        if end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;

        if let Some(limit) = self.limit {
            let requested = offset + bytes.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }

        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if new_size > current {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate {current} bytes up to {new_size}"),
            )));
        }
        // new_size <= current, which already fits in usize
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        if let Some(limit) = self.limit {
            let requested = bytes.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }
        *self.data.write() = bytes.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_reports_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_at(1, 3).unwrap(), b"bcd");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn clones_share_content() {
        let backend = InMemoryBackend::new();
        let mut writer = backend.clone();
        writer.append(b"hello").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"hello");
    }

    #[test]
    fn limit_rejects_growth() {
        let mut backend = InMemoryBackend::with_limit(4);
        backend.append(b"ab").unwrap();
        let err = backend.append(b"cde").unwrap_err();
        assert!(err.is_quota());
        // the failed append leaves prior content untouched
        assert_eq!(backend.snapshot(), b"ab");
    }

    #[test]
    fn replace_swaps_everything() {
        let mut backend = InMemoryBackend::with_data(b"old content".to_vec());
        backend.replace(b"new").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"new");
    }

    #[test]
    fn truncate_shrinks_but_never_grows() {
        let mut backend = InMemoryBackend::with_data(b"0123456789".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"0123");
        assert!(backend.truncate(10).is_err());
    }

    proptest::proptest! {
        #[test]
        fn appends_concatenate(chunks in proptest::collection::vec(
            proptest::collection::vec(proptest::prelude::any::<u8>(), 0..32),
            0..16,
        )) {
            let mut backend = InMemoryBackend::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                let offset = backend.append(chunk).unwrap();
                proptest::prop_assert_eq!(offset, expected.len() as u64);
                expected.extend_from_slice(chunk);
            }
            proptest::prop_assert_eq!(backend.read_all().unwrap(), expected);
        }
    }
}
