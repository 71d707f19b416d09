//! The object store engine.
//!
//! An [`Engine`] holds named collections of JSON records, their declared
//! secondary indexes and a small expiring cache. Everything lives in memory
//! while the engine is open; durability comes from an append-only journal
//! that is replayed on [`Engine::initialize`].
//!
//! # Write path
//!
//! 1. Validate the request against the in-memory image.
//! 2. Append exactly one journal frame.
//! 3. Apply the change in memory.
//!
//! A batch is a single frame, so a batch is either fully durable or absent
//! after a crash.
//!
//! # Example
//!
//! ```rust
//! use learnstore_core::{Config, Engine};
//! use serde_json::json;
//!
//! let engine = Engine::in_memory(Config::default());
//! engine.initialize().unwrap();
//! engine.put("lessons", json!({"id": "l1", "courseId": "rust-101"})).unwrap();
//! assert_eq!(engine.get_all_by_index("lessons", "courseId", &json!("rust-101")).unwrap().len(), 1);
//! ```

mod cache;
mod records;
mod state;

pub use cache::CacheEntry;

use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::Journal;
use crate::manifest::Manifest;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::schema::CollectionSchema;
use crate::types::{now_iso, now_millis};
use learnstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use state::OpenState;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where an engine's bytes come from.
enum StoreSource {
    /// A locked store directory.
    Directory(PathBuf),
    /// A caller-supplied backend. Held here while the engine is closed.
    Backend {
        backend: Option<Box<dyn StorageBackend>>,
        manifest: Option<Manifest>,
    },
}

/// Record counts and journal figures of an open engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Store name from the manifest.
    pub store_name: String,
    /// Schema version recorded in the manifest.
    pub schema_version: u32,
    /// Record count per collection.
    pub collections: BTreeMap<String, usize>,
    /// Live and not yet purged cache entries.
    pub cache_entries: usize,
    /// Frames in the journal.
    pub journal_frames: u64,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Operation counters since open.
    pub metrics: MetricsSnapshot,
}

/// Outcome of [`Engine::vacuum`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacuumReport {
    /// Journal size before compaction.
    pub bytes_before: u64,
    /// Journal size after compaction.
    pub bytes_after: u64,
    /// Frames before compaction.
    pub frames_before: u64,
    /// Frames after compaction.
    pub frames_after: u64,
    /// Expired cache entries dropped.
    pub expired_cache_entries: usize,
}

/// An embedded document store.
///
/// The engine is `Send + Sync`; wrap it in an `Arc` to share it between the
/// migration manager, repositories and maintenance utilities. Readers run
/// concurrently, writers are serialized.
pub struct Engine {
    config: Config,
    source: Mutex<StoreSource>,
    state: RwLock<Option<OpenState>>,
    metrics: EngineMetrics,
}

impl Engine {
    /// Creates an engine over a caller-supplied journal backend.
    ///
    /// Nothing is read until [`initialize`](Self::initialize).
    pub fn new(config: Config, backend: Box<dyn StorageBackend>) -> Self {
        Self::with_source(
            config,
            StoreSource::Backend {
                backend: Some(backend),
                manifest: None,
            },
        )
    }

    /// Creates an engine over a store directory.
    ///
    /// The directory is created and locked by [`initialize`](Self::initialize).
    pub fn open(path: impl AsRef<Path>, config: Config) -> Self {
        Self::with_source(config, StoreSource::Directory(path.as_ref().to_path_buf()))
    }

    /// Creates an engine whose journal lives in memory.
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Box::new(InMemoryBackend::new()))
    }

    fn with_source(config: Config, source: StoreSource) -> Self {
        Self {
            config,
            source: Mutex::new(source),
            state: RwLock::new(None),
            metrics: EngineMetrics::new(),
        }
    }

    /// Opens the store: takes the directory lock, replays the journal and
    /// declares every configured collection and index.
    ///
    /// Calling it on an open engine does nothing.
    ///
    /// # Errors
    ///
    /// Every failure to open is reported as `StorageUnavailable`.
    pub fn initialize(&self) -> CoreResult<()> {
        let mut guard = self.state.write();
        if guard.is_some() {
            return Ok(());
        }

        let mut source = self.source.lock();
        let state = self.open_state(&mut source).map_err(|err| match err {
            CoreError::StorageUnavailable { .. } => err,
            other => CoreError::storage_unavailable(other.to_string()),
        })?;

        tracing::info!(
            store = %state.manifest.store_name,
            schema_version = state.manifest.schema_version,
            collections = state.collections.len(),
            journal_frames = state.journal.frames(),
            "store opened"
        );
        *guard = Some(state);
        Ok(())
    }

    fn open_state(&self, source: &mut StoreSource) -> CoreResult<OpenState> {
        let (dir, backend, manifest) = match source {
            StoreSource::Directory(path) => {
                let dir = StoreDir::open(path, self.config.create_if_missing)?;
                let manifest = dir.load_manifest()?;
                let backend: Box<dyn StorageBackend> =
                    Box::new(FileBackend::open(&dir.journal_path())?);
                (Some(dir), backend, manifest)
            }
            StoreSource::Backend { backend, manifest } => {
                let backend = backend.take().ok_or_else(|| {
                    CoreError::storage_unavailable("storage backend was lost by a failed open")
                })?;
                (None, backend, manifest.take())
            }
        };

        let manifest = manifest.unwrap_or_else(|| Manifest::new(&self.config.store_name));
        let mut journal = Journal::new(backend, self.config.sync_on_write);

        if manifest.schema_version > self.config.schema_version {
            let err = CoreError::storage_unavailable(format!(
                "store schema version {} is newer than configured version {}",
                manifest.schema_version, self.config.schema_version
            ));
            restore_source(source, journal, manifest);
            return Err(err);
        }

        let replay = match journal.replay() {
            Ok(replay) => replay,
            Err(err) => {
                restore_source(source, journal, manifest);
                return Err(err);
            }
        };

        let mut state = OpenState::new(dir, manifest, journal);
        for schema in &self.config.collections {
            state.declare(schema.clone());
        }
        for op in replay.ops {
            state.apply(op);
        }
        for name in state.collections.keys() {
            if !self.config.collections.iter().any(|c| &c.name == name) {
                tracing::warn!(collection = %name, "journal holds an undeclared collection");
            }
        }

        let stored_version = state.manifest.schema_version;
        if self.config.schema_version > stored_version {
            tracing::info!(
                from = stored_version,
                to = self.config.schema_version,
                "upgrading store schema"
            );
            state.manifest.schema_version = self.config.schema_version;
        }
        for schema in &self.config.collections {
            state.manifest.declare_collection(&schema.name);
        }

        if let Err(err) = state.save_manifest() {
            restore_source(source, state.journal, state.manifest);
            return Err(err);
        }
        Ok(state)
    }

    /// Closes the store, syncing the journal and releasing the directory
    /// lock. A closed engine can be initialized again.
    pub fn close(&self) -> CoreResult<()> {
        let mut guard = self.state.write();
        let Some(mut state) = guard.take() else {
            return Ok(());
        };

        let synced = state.journal.sync();
        let mut source = self.source.lock();
        restore_source(&mut source, state.journal, state.manifest);
        tracing::info!("store closed");
        synced
    }

    /// Returns true between `initialize` and `close`.
    pub fn is_open(&self) -> bool {
        self.state.read().is_some()
    }

    /// Returns the configuration the engine was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the live operation counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&OpenState) -> CoreResult<R>) -> CoreResult<R> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(CoreError::StoreClosed)?;
        f(state).inspect_err(|_| self.metrics.record_error())
    }

    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut OpenState) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(CoreError::StoreClosed)?;
        let result = f(&mut *state).inspect_err(|_| self.metrics.record_error())?;
        self.maybe_auto_vacuum(state);
        Ok(result)
    }

    /// Returns the names of every declared collection.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.read(|state| Ok(state.collections.keys().cloned().collect()))
    }

    /// Returns the declaration of one collection.
    pub fn schema(&self, collection: &str) -> CoreResult<CollectionSchema> {
        self.read(|state| Ok(state.collection(collection)?.schema.clone()))
    }

    /// Returns record counts per collection and journal figures.
    pub fn stats(&self) -> CoreResult<EngineStats> {
        self.read(|state| {
            Ok(EngineStats {
                store_name: state.manifest.store_name.clone(),
                schema_version: state.manifest.schema_version,
                collections: state
                    .collections
                    .iter()
                    .map(|(name, c)| (name.clone(), c.records.len()))
                    .collect(),
                cache_entries: state.cache.len(),
                journal_frames: state.journal.frames(),
                journal_bytes: state.journal.size()?,
                metrics: self.metrics.snapshot(),
            })
        })
    }

    /// Drops expired cache entries and rewrites the journal as a compact
    /// image of the live data.
    ///
    /// Never needed for correctness; it only bounds journal growth.
    pub fn vacuum(&self) -> CoreResult<VacuumReport> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(CoreError::StoreClosed)?;
        self.vacuum_locked(state)
            .inspect_err(|_| self.metrics.record_error())
    }

    fn vacuum_locked(&self, state: &mut OpenState) -> CoreResult<VacuumReport> {
        let bytes_before = state.journal.size()?;
        let frames_before = state.journal.frames();

        let now = now_millis();
        let before = state.cache.len();
        state.cache.retain(|_, entry| !entry.is_expired(now));
        let expired_cache_entries = before - state.cache.len();

        let image = state.image();
        state.journal.rewrite(&image)?;
        state.manifest.last_vacuum = Some(now_iso());
        state.save_manifest()?;
        self.metrics.record_vacuum();

        let report = VacuumReport {
            bytes_before,
            bytes_after: state.journal.size()?,
            frames_before,
            frames_after: state.journal.frames(),
            expired_cache_entries,
        };
        tracing::info!(
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            expired_cache_entries,
            "journal compacted"
        );
        Ok(report)
    }

    fn maybe_auto_vacuum(&self, state: &mut OpenState) {
        let threshold = self.config.auto_vacuum_threshold;
        if threshold == 0 || state.journal.frames_since_compaction() < threshold {
            return;
        }
        if let Err(err) = self.vacuum_locked(state) {
            tracing::warn!(error = %err, "automatic compaction failed");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store_name", &self.config.store_name)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn restore_source(source: &mut StoreSource, journal: Journal, state_manifest: Manifest) {
    if let StoreSource::Backend { backend, manifest } = source {
        *backend = Some(journal.into_backend());
        *manifest = Some(state_manifest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDefinition;
    use serde_json::json;
    use tempfile::tempdir;

    fn notes_config() -> Config {
        Config::default().collections(vec![CollectionSchema::new("notes")
            .with_index(IndexDefinition::field("tag", "tag"))])
    }

    #[test]
    fn initialize_is_idempotent() {
        let engine = Engine::in_memory(notes_config());
        engine.initialize().unwrap();
        engine.put("notes", json!({"id": "n1"})).unwrap();
        engine.initialize().unwrap();
        assert_eq!(engine.count("notes", None).unwrap(), 1);
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = Engine::in_memory(notes_config());
        assert!(matches!(
            engine.get("notes", "n1"),
            Err(CoreError::StoreClosed)
        ));
        engine.initialize().unwrap();
        engine.close().unwrap();
        assert!(!engine.is_open());
        assert!(matches!(
            engine.count("notes", None),
            Err(CoreError::StoreClosed)
        ));
    }

    #[test]
    fn reopen_replays_the_journal() {
        let engine = Engine::in_memory(notes_config());
        engine.initialize().unwrap();
        engine.put("notes", json!({"id": "n1", "tag": "a"})).unwrap();
        engine.put("notes", json!({"id": "n2", "tag": "b"})).unwrap();
        engine.delete("notes", "n1").unwrap();
        engine.close().unwrap();

        engine.initialize().unwrap();
        assert!(engine.get("notes", "n1").unwrap().is_none());
        assert_eq!(
            engine
                .get_all_by_index("notes", "tag", &json!("b"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn file_store_survives_restart_and_locks() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let engine = Engine::open(&path, notes_config());
        engine.initialize().unwrap();
        engine.put("notes", json!({"id": "n1", "tag": "a"})).unwrap();

        let rival = Engine::open(&path, notes_config());
        assert!(matches!(
            rival.initialize(),
            Err(CoreError::StorageUnavailable { .. })
        ));

        engine.close().unwrap();
        rival.initialize().unwrap();
        assert!(rival.get("notes", "n1").unwrap().is_some());
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let temp = tempdir().unwrap();
        let engine = Engine::open(
            temp.path().join("absent"),
            notes_config().create_if_missing(false),
        );
        assert!(matches!(
            engine.initialize(),
            Err(CoreError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn quota_on_write_surfaces_as_storage_error() {
        let engine = Engine::new(notes_config(), Box::new(InMemoryBackend::with_limit(64)));
        engine.initialize().unwrap();
        let big = "x".repeat(256);
        let err = engine.put("notes", json!({"id": "n1", "body": big})).unwrap_err();
        assert!(matches!(err, CoreError::Storage(ref e) if e.is_quota()));
        assert!(engine.get("notes", "n1").unwrap().is_none());
    }

    #[test]
    fn newer_schema_versions_declare_new_collections() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let v1 = Engine::open(&path, notes_config().schema_version(1));
        v1.initialize().unwrap();
        v1.put("notes", json!({"id": "n1"})).unwrap();
        v1.close().unwrap();

        let v2 = Engine::open(
            &path,
            notes_config()
                .schema_version(2)
                .with_collection(CollectionSchema::new("tags")),
        );
        v2.initialize().unwrap();
        assert_eq!(v2.stats().unwrap().schema_version, 2);
        assert_eq!(v2.count("tags", None).unwrap(), 0);
        assert_eq!(v2.count("notes", None).unwrap(), 1);
        v2.close().unwrap();

        let old = Engine::open(&path, notes_config().schema_version(1));
        assert!(matches!(
            old.initialize(),
            Err(CoreError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn vacuum_compacts_history() {
        let engine = Engine::in_memory(notes_config().auto_vacuum_threshold(0));
        engine.initialize().unwrap();
        for i in 0..10 {
            engine
                .put("notes", json!({"id": "n1", "rev": i}))
                .unwrap();
        }
        let report = engine.vacuum().unwrap();
        assert_eq!(report.frames_before, 10);
        assert_eq!(report.frames_after, 1);
        assert!(report.bytes_after < report.bytes_before);

        engine.close().unwrap();
        engine.initialize().unwrap();
        let note = engine.get("notes", "n1").unwrap().unwrap();
        assert_eq!(note.get("rev"), Some(&json!(9)));
    }

    #[test]
    fn auto_vacuum_bounds_the_journal() {
        let engine = Engine::in_memory(notes_config().auto_vacuum_threshold(5));
        engine.initialize().unwrap();
        for i in 0..12 {
            engine.put("notes", json!({"id": "n1", "rev": i})).unwrap();
        }
        let stats = engine.stats().unwrap();
        assert!(stats.journal_frames < 5);
        assert_eq!(stats.collections["notes"], 1);
    }
}
