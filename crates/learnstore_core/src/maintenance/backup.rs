//! Point-in-time backups.
//!
//! A backup is a [`BackupFile`]: a snapshot of every collection plus a
//! SHA-256 checksum of the snapshot's JSON encoding. Backups live either in
//! the engine cache under `backup:` keys, expiring after the configured
//! retention, or in standalone JSON files.
//!
//! ```text
//! {
//!   "format": "learnstore-backup",
//!   "version": 1,
//!   "createdAt": "2024-05-01T10:00:00.000Z",
//!   "storeName": "learnstore",
//!   "checksum": "9f86d0...",
//!   "collections": { "users": [ ... ], ... }
//! }
//! ```

use super::{ImportOptions, ImportReport, Maintenance, Snapshot};
use crate::error::{CoreError, CoreResult};
use crate::types::{new_id, now_iso, now_millis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Cache key prefix of stored backups.
pub const BACKUP_PREFIX: &str = "backup:";
/// `format` tag of backup files.
pub const BACKUP_FORMAT: &str = "learnstore-backup";
/// Current backup file version.
pub const BACKUP_VERSION: u32 = 1;

/// A checksummed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    /// Always [`BACKUP_FORMAT`].
    pub format: String,
    /// Layout version.
    pub version: u32,
    /// When the snapshot was taken.
    pub created_at: String,
    /// Name of the store it was taken from.
    pub store_name: String,
    /// Hex SHA-256 of the JSON-encoded `collections`.
    pub checksum: String,
    /// The snapshot.
    pub collections: Snapshot,
}

impl BackupFile {
    /// Wraps a snapshot, computing its checksum.
    pub fn new(store_name: impl Into<String>, collections: Snapshot) -> CoreResult<Self> {
        Ok(Self {
            format: BACKUP_FORMAT.to_string(),
            version: BACKUP_VERSION,
            created_at: now_iso(),
            store_name: store_name.into(),
            checksum: checksum(&collections)?,
            collections,
        })
    }

    /// Checks the format tag, version and checksum.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` for a foreign or newer file, `ChecksumMismatch` when
    /// the snapshot was altered.
    pub fn verify(&self) -> CoreResult<()> {
        if self.format != BACKUP_FORMAT {
            return Err(CoreError::invalid_format(format!(
                "not a backup: format {:?}",
                self.format
            )));
        }
        if self.version > BACKUP_VERSION {
            return Err(CoreError::invalid_format(format!(
                "backup version {} is newer than supported version {BACKUP_VERSION}",
                self.version
            )));
        }
        let actual = checksum(&self.collections)?;
        if actual != self.checksum {
            return Err(CoreError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Returns the number of records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    fn summary(&self, key: impl Into<String>) -> BackupSummary {
        BackupSummary {
            key: key.into(),
            created_at: self.created_at.clone(),
            collections: self.collections.len(),
            records: self.record_count(),
        }
    }
}

/// Listing entry of a stored backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    /// Cache key, or file path for file backups.
    pub key: String,
    /// When the snapshot was taken.
    pub created_at: String,
    /// Number of collections.
    pub collections: usize,
    /// Number of records.
    pub records: usize,
}

fn checksum(collections: &Snapshot) -> CoreResult<String> {
    let digest = Sha256::digest(serde_json::to_vec(collections)?);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

impl Maintenance {
    /// Snapshots every collection into the cache. Returns the backup key.
    ///
    /// The entry expires after the configured backup retention.
    pub fn create_backup(&self) -> CoreResult<String> {
        let file = self.snapshot_file(None)?;
        let key = format!("{BACKUP_PREFIX}{:013}-{}", now_millis(), new_id());
        let retention = self.engine.config().backup_retention;
        self.engine
            .set_cache(&key, serde_json::to_value(&file)?, Some(retention))?;
        tracing::info!(key = %key, records = file.record_count(), "backup created");
        Ok(key)
    }

    /// Lists unexpired stored backups, oldest first.
    pub fn list_backups(&self) -> CoreResult<Vec<BackupSummary>> {
        let mut backups = Vec::new();
        for key in self.engine.cache_keys(BACKUP_PREFIX)? {
            if let Some(value) = self.engine.get_cache(&key)? {
                let file: BackupFile = serde_json::from_value(value)?;
                backups.push(file.summary(key));
            }
        }
        Ok(backups)
    }

    /// Imports a stored backup.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the key is unknown or expired, plus everything
    /// [`BackupFile::verify`] and [`Maintenance::import_data`] raise.
    pub fn restore_backup(&self, key: &str, options: &ImportOptions) -> CoreResult<ImportReport> {
        let value = self
            .engine
            .get_cache(key)?
            .ok_or_else(|| CoreError::invalid_operation(format!("no backup under {key}")))?;
        let file: BackupFile = serde_json::from_value(value)?;
        file.verify()?;
        let report = self.import_data(&file.collections, options)?;
        tracing::info!(key, imported = report.imported, "backup restored");
        Ok(report)
    }

    /// Writes a backup of the named collections, or of all of them, to a
    /// file. The file is replaced atomically.
    pub fn write_backup_file(
        &self,
        path: impl AsRef<Path>,
        collections: Option<&[&str]>,
    ) -> CoreResult<BackupSummary> {
        let path = path.as_ref();
        let file = self.snapshot_file(collections)?;
        let data = serde_json::to_vec_pretty(&file)?;

        let temp_path = path.with_extension("tmp");
        let mut out = File::create(&temp_path)?;
        out.write_all(&data)?;
        out.sync_all()?;
        drop(out);
        fs::rename(&temp_path, path)?;

        tracing::info!(
            path = %path.display(),
            records = file.record_count(),
            "backup file written"
        );
        Ok(file.summary(path.display().to_string()))
    }

    /// Reads and verifies a backup file.
    pub fn read_backup_file(path: impl AsRef<Path>) -> CoreResult<BackupFile> {
        let data = fs::read(path.as_ref())?;
        let file: BackupFile = serde_json::from_slice(&data)?;
        file.verify()?;
        Ok(file)
    }

    fn snapshot_file(&self, collections: Option<&[&str]>) -> CoreResult<BackupFile> {
        let export = self.export_data(collections)?;
        for warning in &export.warnings {
            tracing::warn!(warning = %warning, "backup is missing a collection");
        }
        BackupFile::new(self.engine.config().store_name.clone(), export.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::Engine;
    use crate::types::Record;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn maintenance(config: Config) -> Maintenance {
        let engine = Arc::new(Engine::in_memory(config));
        engine.initialize().unwrap();
        engine
            .put("users", json!({"id": "u1", "email": "a@x.io", "username": "a"}))
            .unwrap();
        Maintenance::new(engine)
    }

    #[test]
    fn stored_backup_restores() {
        let m = maintenance(Config::default());
        let key = m.create_backup().unwrap();
        assert!(key.starts_with(BACKUP_PREFIX));

        m.engine().delete("users", "u1").unwrap();
        let listed = m.list_backups().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].records, 1);

        let report = m
            .restore_backup(&key, &ImportOptions::new().clear_existing(true))
            .unwrap();
        assert!(report.imported >= 1);
        assert!(m.engine().get("users", "u1").unwrap().is_some());
    }

    #[test]
    fn expired_backups_are_gone() {
        let m = maintenance(Config::default().backup_retention(Duration::ZERO));
        let key = m.create_backup().unwrap();

        assert!(m.list_backups().unwrap().is_empty());
        assert!(matches!(
            m.restore_backup(&key, &ImportOptions::new()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn backup_files_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("backup.json");
        let m = maintenance(Config::default());

        let summary = m.write_backup_file(&path, Some(&["users"])).unwrap();
        assert_eq!(summary.collections, 1);

        let file = Maintenance::read_backup_file(&path).unwrap();
        assert_eq!(file.collections["users"].len(), 1);
        assert_eq!(file.store_name, "learnstore");
    }

    #[test]
    fn tampered_files_fail_the_checksum() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("backup.json");
        let m = maintenance(Config::default());
        m.write_backup_file(&path, None).unwrap();

        let mut file: BackupFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        file.collections
            .get_mut("users")
            .unwrap()
            .push(Record::from_value(json!({"id": "intruder"})).unwrap());
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        assert!(matches!(
            Maintenance::read_backup_file(&path),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn foreign_files_are_rejected() {
        let mut file = BackupFile::new("x", Snapshot::new()).unwrap();
        file.format = "something-else".into();
        assert!(matches!(file.verify(), Err(CoreError::InvalidFormat { .. })));
    }
}
