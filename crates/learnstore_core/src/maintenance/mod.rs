//! Cross-collection maintenance: export, import, integrity checks, orphan
//! cleanup and backups.
//!
//! Everything here works on the wire form of records, so a snapshot is
//! exactly what `export_data` produces and `import_data` accepts.

mod backup;
mod integrity;

pub use backup::{BackupFile, BackupSummary, BACKUP_FORMAT, BACKUP_PREFIX, BACKUP_VERSION};
pub use integrity::{IntegrityIssue, IntegrityReport};

use crate::engine::Engine;
use crate::entity::EntityKind;
use crate::error::{CoreError, CoreResult};
use crate::types::{Record, ID_FIELD};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Records of several collections, keyed by collection name.
pub type Snapshot = BTreeMap<String, Vec<Record>>;

/// Result of [`Maintenance::export_data`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    /// Exported records.
    pub snapshot: Snapshot,
    /// Collections that could not be read; they appear empty in the snapshot.
    pub warnings: Vec<String>,
}

/// Options for [`Maintenance::import_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Replace each target collection's content instead of adding to it.
    pub clear_existing: bool,
    /// Collect per-collection failures instead of aborting.
    pub skip_errors: bool,
}

impl ImportOptions {
    /// Fail-fast import that keeps existing records.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clear_existing: false,
            skip_errors: false,
        }
    }

    /// Sets whether imported records replace each target collection.
    #[must_use]
    pub const fn clear_existing(mut self, value: bool) -> Self {
        self.clear_existing = value;
        self
    }

    /// Sets whether failures are collected instead of aborting.
    #[must_use]
    pub const fn skip_errors(mut self, value: bool) -> Self {
        self.skip_errors = value;
        self
    }
}

/// A collection that failed to import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// Collection name.
    pub collection: String,
    /// Why it failed.
    pub message: String,
}

/// Result of [`Maintenance::import_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Records written across all collections.
    pub imported: usize,
    /// Records written per collection.
    pub collections: BTreeMap<String, usize>,
    /// Collections skipped because they failed.
    pub errors: Vec<ImportFailure>,
}

/// Result of [`Maintenance::cleanup_orphaned_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Records deleted across all collections.
    pub cleaned: usize,
    /// Records deleted per user-owned collection.
    pub details: BTreeMap<String, usize>,
    /// Collections that could not be cleaned.
    pub errors: Vec<String>,
}

/// Maintenance utilities over one engine.
#[derive(Debug, Clone)]
pub struct Maintenance {
    engine: Arc<Engine>,
}

impl Maintenance {
    /// Creates the utilities.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Exports the named collections, or every declared collection.
    ///
    /// A collection that cannot be read is exported empty with a warning.
    ///
    /// # Errors
    ///
    /// Only when the declared collections cannot be listed.
    pub fn export_data(&self, collections: Option<&[&str]>) -> CoreResult<ExportReport> {
        let names = match collections {
            Some(names) => names.iter().map(ToString::to_string).collect(),
            None => self.engine.collection_names()?,
        };

        let mut report = ExportReport::default();
        for name in names {
            let records = match self.engine.get_all(&name, None, None) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(collection = %name, error = %err, "export skipped collection");
                    report.warnings.push(format!("{name}: {err}"));
                    Vec::new()
                }
            };
            report.snapshot.insert(name, records);
        }
        tracing::info!(
            collections = report.snapshot.len(),
            warnings = report.warnings.len(),
            "export finished"
        );
        Ok(report)
    }

    /// Writes a snapshot back into the store.
    ///
    /// Each collection is written as one atomic batch. With
    /// `clear_existing` the batch replaces the collection's content, so a
    /// collection whose import fails keeps what it held.
    ///
    /// # Errors
    ///
    /// `ImportError` naming the first collection that failed, unless
    /// `skip_errors` is set. Collections imported before it stay imported.
    pub fn import_data(
        &self,
        snapshot: &Snapshot,
        options: &ImportOptions,
    ) -> CoreResult<ImportReport> {
        let mut report = ImportReport::default();
        for (name, records) in snapshot {
            match self.import_collection(name, records, options.clear_existing) {
                Ok(written) => {
                    report.imported += written;
                    report.collections.insert(name.clone(), written);
                }
                Err(err) if options.skip_errors => {
                    tracing::warn!(collection = %name, error = %err, "import skipped collection");
                    report.errors.push(ImportFailure {
                        collection: name.clone(),
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(CoreError::import_error(name.as_str(), err)),
            }
        }
        tracing::info!(
            imported = report.imported,
            failed = report.errors.len(),
            "import finished"
        );
        Ok(report)
    }

    fn import_collection(&self, name: &str, records: &[Record], clear: bool) -> CoreResult<usize> {
        if let Some(position) = records.iter().position(|r| r.id().is_none()) {
            return Err(CoreError::invalid_format(format!(
                "record {position} has no string {ID_FIELD}"
            )));
        }
        if clear {
            self.engine.replace_collection(name, records.iter().cloned())
        } else {
            self.engine.batch_put(name, records.iter().cloned())
        }
    }

    /// Lists the records whose owning user no longer exists, per user-owned
    /// collection. Records without an owner id count as orphaned.
    pub fn find_orphans(&self) -> CoreResult<BTreeMap<String, Vec<String>>> {
        let users = self.live_user_ids()?;
        let mut orphans = BTreeMap::new();
        for kind in EntityKind::ALL {
            let Some(owner) = kind.owner_field() else {
                continue;
            };
            let name = kind.collection_name();
            orphans.insert(name.to_string(), self.orphan_ids(name, owner, &users)?);
        }
        Ok(orphans)
    }

    /// Deletes every record whose owning user no longer exists.
    ///
    /// Failures are reported in the result. When the user collection itself
    /// cannot be read nothing is deleted.
    pub fn cleanup_orphaned_data(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let users = match self.live_user_ids() {
            Ok(users) => users,
            Err(err) => {
                report.errors.push(format!("users: {err}"));
                return report;
            }
        };

        for kind in EntityKind::ALL {
            let Some(owner) = kind.owner_field() else {
                continue;
            };
            let name = kind.collection_name();
            match self.cleanup_collection(name, owner, &users) {
                Ok(deleted) => {
                    report.cleaned += deleted;
                    report.details.insert(name.to_string(), deleted);
                }
                Err(err) => {
                    tracing::warn!(collection = name, error = %err, "orphan cleanup failed");
                    report.errors.push(format!("{name}: {err}"));
                }
            }
        }
        tracing::info!(cleaned = report.cleaned, "orphan cleanup finished");
        report
    }

    fn cleanup_collection(
        &self,
        name: &str,
        owner: &str,
        users: &BTreeSet<String>,
    ) -> CoreResult<usize> {
        let orphans = self.orphan_ids(name, owner, users)?;
        self.engine.batch_delete(name, orphans)
    }

    fn orphan_ids(
        &self,
        name: &str,
        owner: &str,
        users: &BTreeSet<String>,
    ) -> CoreResult<Vec<String>> {
        Ok(self
            .engine
            .get_all(name, None, None)?
            .iter()
            .filter(|record| !record.get_str(owner).is_some_and(|id| users.contains(id)))
            .filter_map(|record| record.id().map(str::to_string))
            .collect())
    }

    fn live_user_ids(&self) -> CoreResult<BTreeSet<String>> {
        Ok(self
            .engine
            .get_all(EntityKind::Users.collection_name(), None, None)?
            .iter()
            .filter_map(|record| record.id().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn maintenance() -> Maintenance {
        let engine = Arc::new(Engine::in_memory(Config::default()));
        engine.initialize().unwrap();
        Maintenance::new(engine)
    }

    fn seed(m: &Maintenance) {
        let engine = m.engine();
        engine.put("users", json!({"id": "u1", "email": "a@x.io", "username": "a"})).unwrap();
        engine
            .put("progress", json!({"id": "p1", "userId": "u1", "lessonId": "l1"}))
            .unwrap();
        engine
            .put("progress", json!({"id": "p2", "userId": "gone", "lessonId": "l1"}))
            .unwrap();
        engine
            .put("projects", json!({"id": "j1", "title": "untitled"}))
            .unwrap();
    }

    #[test]
    fn export_import_round_trips() {
        let m = maintenance();
        seed(&m);
        let exported = m.export_data(None).unwrap();
        assert!(exported.warnings.is_empty());

        m.engine().put("users", json!({"id": "u9", "email": "z@x.io", "username": "z"})).unwrap();
        m.engine().delete("progress", "p1").unwrap();

        m.import_data(&exported.snapshot, &ImportOptions::new().clear_existing(true))
            .unwrap();
        assert_eq!(m.export_data(None).unwrap().snapshot, exported.snapshot);
    }

    #[test]
    fn export_of_unknown_collection_warns() {
        let m = maintenance();
        seed(&m);
        let report = m.export_data(Some(&["users", "nope"])).unwrap();
        assert_eq!(report.snapshot["users"].len(), 1);
        assert!(report.snapshot["nope"].is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn import_fails_fast_by_default() {
        let m = maintenance();
        let mut snapshot = Snapshot::new();
        snapshot.insert("nope".into(), vec![Record::from_value(json!({"id": "x"})).unwrap()]);
        snapshot.insert("users".into(), vec![Record::from_value(json!({"id": "u1"})).unwrap()]);

        let err = m.import_data(&snapshot, &ImportOptions::new()).unwrap_err();
        assert!(matches!(err, CoreError::ImportError { ref collection, .. } if collection == "nope"));
        assert_eq!(m.engine().count("users", None).unwrap(), 0);

        let report = m
            .import_data(&snapshot, &ImportOptions::new().skip_errors(true))
            .unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].collection, "nope");
    }

    #[test]
    fn failed_import_with_clear_keeps_existing_records() {
        let m = maintenance();
        seed(&m);
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "users".into(),
            vec![
                Record::from_value(json!({"id": "n1", "email": "dup@x.io"})).unwrap(),
                Record::from_value(json!({"id": "n2", "email": "dup@x.io"})).unwrap(),
            ],
        );

        let strict = ImportOptions::new().clear_existing(true);
        assert!(m.import_data(&snapshot, &strict).is_err());
        assert!(m.engine().get("users", "u1").unwrap().is_some());

        let report = m.import_data(&snapshot, &strict.skip_errors(true)).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.imported, 0);
        assert_eq!(m.engine().count("users", None).unwrap(), 1);
    }

    #[test]
    fn import_rejects_records_without_ids() {
        let m = maintenance();
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "users".into(),
            vec![
                Record::from_value(json!({"id": "u1"})).unwrap(),
                Record::from_value(json!({"email": "x"})).unwrap(),
            ],
        );
        let err = m.import_data(&snapshot, &ImportOptions::new()).unwrap_err();
        assert!(matches!(err, CoreError::ImportError { .. }));
        assert_eq!(m.engine().count("users", None).unwrap(), 0);
    }

    #[test]
    fn cleanup_deletes_only_orphans() {
        let m = maintenance();
        seed(&m);

        let orphans = m.find_orphans().unwrap();
        assert_eq!(orphans["progress"], vec!["p2".to_string()]);
        assert_eq!(orphans["projects"], vec!["j1".to_string()]);

        let report = m.cleanup_orphaned_data();
        assert_eq!(report.cleaned, 2);
        assert_eq!(report.details["progress"], 1);
        assert_eq!(report.details["conversations"], 0);
        assert!(report.errors.is_empty());
        assert!(m.engine().get("progress", "p1").unwrap().is_some());
        assert!(m.engine().get("progress", "p2").unwrap().is_none());
    }

    #[test]
    fn cleanup_on_a_closed_store_reports_instead_of_failing() {
        let m = maintenance();
        m.engine().close().unwrap();
        let report = m.cleanup_orphaned_data();
        assert_eq!(report.cleaned, 0);
        assert_eq!(report.errors.len(), 1);
    }
}
