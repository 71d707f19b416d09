//! Store directory management.
//!
//! A file store is a directory:
//!
//! ```text
//! <store>/
//! ├─ LOCK          # exclusive advisory lock, held while open
//! ├─ MANIFEST      # JSON metadata (store name, schema version)
//! └─ journal.log   # append-only mutation journal
//! ```
//!
//! The LOCK file is what makes the store single-writer.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An opened store directory. Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the directory is missing and
    /// `create_if_missing` is false, if the path is not a directory, if
    /// another process holds the lock, or on I/O errors.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::storage_unavailable(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path).map_err(|e| {
                CoreError::storage_unavailable(format!("cannot create {}: {e}", path.display()))
            })?;
        }

        if !path.is_dir() {
            return Err(CoreError::storage_unavailable(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                CoreError::storage_unavailable(format!("cannot open {}: {e}", lock_path.display()))
            })?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::storage_unavailable(format!(
                "store is locked by another process: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Returns the path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Loads the manifest, or `None` for a new store.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&manifest_path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Saves the manifest atomically: temp file, fsync, rename, directory
    /// fsync.
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);
        let data = manifest.encode()?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directories cannot be fsynced.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let store = temp.path().join("new_store");

        let dir = StoreDir::open(&store, true).unwrap();
        assert!(store.is_dir());
        assert_eq!(dir.journal_path(), store.join("journal.log"));
        assert_eq!(dir.manifest_path(), store.join("MANIFEST"));
    }

    #[test]
    fn missing_directory_without_create_is_unavailable() {
        let temp = tempdir().unwrap();
        let result = StoreDir::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(CoreError::StorageUnavailable { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let store = temp.path().join("locked");

        let _first = StoreDir::open(&store, true).unwrap();
        let second = StoreDir::open(&store, true);
        assert!(matches!(second, Err(CoreError::StorageUnavailable { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let store = temp.path().join("reopen");
        {
            let _dir = StoreDir::open(&store, true).unwrap();
        }
        let _again = StoreDir::open(&store, true).unwrap();
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(&temp.path().join("m"), true).unwrap();
        assert!(dir.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::new("learnstore");
        manifest.schema_version = 4;
        manifest.declare_collection("users");
        dir.save_manifest(&manifest).unwrap();

        assert_eq!(dir.load_manifest().unwrap(), Some(manifest));
    }
}
