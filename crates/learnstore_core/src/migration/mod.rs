//! Versioned data migrations.
//!
//! Migrations are registered with a [`MigrationManager`] and applied in
//! ascending version order, each exactly once. Whether a version has run
//! is decided by the [`Ledger`] alone, so a migration body may assume it
//! runs against data it has never touched.
//!
//! ## Lifecycle
//!
//! ```text
//! Registered -> Pending -> Applied -> (RolledBack, if it has a `down`)
//! ```
//!
//! The ledger is saved after every successful migration. If migration N
//! fails the run stops: everything before N stays applied, N and later
//! stay pending, and the caller gets `MigrationFailed { version: N, .. }`.
//!
//! ## Usage
//!
//! ```rust
//! use learnstore_core::migration::{FnMigration, MigrationManager};
//! use learnstore_core::{Config, Engine};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(Engine::in_memory(Config::default()));
//! engine.initialize().unwrap();
//!
//! let mut manager = MigrationManager::new(Arc::clone(&engine));
//! manager
//!     .register(Box::new(FnMigration::new(1, "touch", |ctx| {
//!         ctx.custom("nothing to do");
//!         Ok(())
//!     })))
//!     .unwrap();
//! manager.run_pending_migrations().unwrap();
//! assert_eq!(manager.status().unwrap().pending, 0);
//! ```

mod builtin;
mod ledger;

pub use builtin::{builtin_migrations, AllowAnalyticsDefault, SeedAchievementTemplates};
pub use ledger::{Ledger, LEDGER_KEY};

use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

/// Version number for migrations.
pub type MigrationVersion = u64;

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationInfo {
    /// Version number.
    pub version: MigrationVersion,
    /// Short name.
    pub name: String,
    /// What the migration does.
    pub description: Option<String>,
    /// Whether it can be rolled back.
    pub reversible: bool,
}

/// Something a migration did, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MigrationOperation {
    /// Records inserted.
    Seeded {
        /// Target collection.
        collection: String,
        /// Number of records.
        count: usize,
    },
    /// Records rewritten.
    Updated {
        /// Target collection.
        collection: String,
        /// Number of records.
        count: usize,
    },
    /// Records deleted.
    Removed {
        /// Target collection.
        collection: String,
        /// Number of records.
        count: usize,
    },
    /// Anything else.
    Custom {
        /// Description.
        description: String,
    },
}

/// Handle a migration body works through.
///
/// Dereferences to the [`Engine`], so bodies call engine operations
/// directly (`ctx.get_all(..)`, `ctx.batch_put(..)`).
pub struct MigrationContext<'a> {
    engine: &'a Engine,
    version: MigrationVersion,
    operations: Vec<MigrationOperation>,
}

impl<'a> MigrationContext<'a> {
    fn new(engine: &'a Engine, version: MigrationVersion) -> Self {
        Self {
            engine,
            version,
            operations: Vec::new(),
        }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// Version of the running migration.
    #[must_use]
    pub fn version(&self) -> MigrationVersion {
        self.version
    }

    /// Records inserted records.
    pub fn seeded(&mut self, collection: &str, count: usize) {
        self.operations.push(MigrationOperation::Seeded {
            collection: collection.to_string(),
            count,
        });
    }

    /// Records rewritten records.
    pub fn updated(&mut self, collection: &str, count: usize) {
        self.operations.push(MigrationOperation::Updated {
            collection: collection.to_string(),
            count,
        });
    }

    /// Records deleted records.
    pub fn removed(&mut self, collection: &str, count: usize) {
        self.operations.push(MigrationOperation::Removed {
            collection: collection.to_string(),
            count,
        });
    }

    /// Records anything else.
    pub fn custom(&mut self, description: &str) {
        self.operations.push(MigrationOperation::Custom {
            description: description.to_string(),
        });
    }

    /// Operations recorded so far.
    #[must_use]
    pub fn operations(&self) -> &[MigrationOperation] {
        &self.operations
    }
}

impl Deref for MigrationContext<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

/// A versioned data migration.
pub trait Migration: Send + Sync {
    /// Version number; unique and greater than zero.
    fn version(&self) -> MigrationVersion;

    /// Short name.
    fn name(&self) -> &str;

    /// What the migration does.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Applies the migration.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()>;

    /// Reverts the migration.
    fn down(&self, _ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        Err(CoreError::RollbackUnsupported {
            version: self.version(),
        })
    }

    /// Whether [`down`](Self::down) is implemented.
    fn supports_rollback(&self) -> bool {
        false
    }
}

type MigrationFn = Box<dyn Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync>;

/// A migration built from closures.
pub struct FnMigration {
    version: MigrationVersion,
    name: String,
    description: Option<String>,
    up: MigrationFn,
    down: Option<MigrationFn>,
}

impl FnMigration {
    /// Creates a forward-only migration.
    pub fn new<F>(version: MigrationVersion, name: impl Into<String>, up: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            version,
            name: name.into(),
            description: None,
            up: Box::new(up),
            down: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Makes the migration reversible.
    #[must_use]
    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.down = Some(Box::new(down));
        self
    }
}

impl Migration for FnMigration {
    fn version(&self) -> MigrationVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        (self.up)(ctx)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        match &self.down {
            Some(down) => down(ctx),
            None => Err(CoreError::RollbackUnsupported {
                version: self.version,
            }),
        }
    }

    fn supports_rollback(&self) -> bool {
        self.down.is_some()
    }
}

/// One migration that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    /// Version.
    pub version: MigrationVersion,
    /// Name.
    pub name: String,
    /// What it did.
    pub operations: Vec<MigrationOperation>,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRunReport {
    /// Migrations applied by this run, ascending.
    pub applied: Vec<MigrationOutcome>,
    /// Highest applied version after the run, 0 if none.
    pub final_version: MigrationVersion,
}

/// Applied and pending versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    /// Registered migrations.
    pub total: usize,
    /// Entries in the ledger.
    pub applied: usize,
    /// Registered migrations not in the ledger.
    pub pending: usize,
    /// Ledger contents, ascending.
    pub applied_versions: Vec<MigrationVersion>,
    /// Pending versions, ascending.
    pub pending_versions: Vec<MigrationVersion>,
}

/// Registry and runner of migrations against one engine.
pub struct MigrationManager {
    engine: Arc<Engine>,
    migrations: BTreeMap<MigrationVersion, Box<dyn Migration>>,
    run_lock: Mutex<()>,
}

impl MigrationManager {
    /// Creates a manager with no migrations registered.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            migrations: BTreeMap::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// Creates a manager with the application's migrations registered.
    pub fn with_builtin(engine: Arc<Engine>) -> CoreResult<Self> {
        let mut manager = Self::new(engine);
        for migration in builtin_migrations() {
            manager.register(migration)?;
        }
        Ok(manager)
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// `DuplicateVersion` if the version is taken, `InvalidOperation` for
    /// version 0.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::invalid_operation(
                "migration versions start at 1",
            ));
        }
        if self.migrations.contains_key(&version) {
            return Err(CoreError::DuplicateVersion { version });
        }
        tracing::debug!(version, name = migration.name(), "migration registered");
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns every registered migration, ascending.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info(m.as_ref())).collect()
    }

    /// Returns the registered migrations not yet applied, ascending.
    pub fn pending(&self) -> CoreResult<Vec<MigrationInfo>> {
        let ledger = Ledger::load(&self.engine)?;
        Ok(self
            .migrations
            .values()
            .filter(|m| !ledger.contains(m.version()))
            .map(|m| info(m.as_ref()))
            .collect())
    }

    /// Reports irregularities that do not stop a run: version gaps and
    /// ledger entries with no registered migration.
    pub fn validate(&self) -> CoreResult<Vec<String>> {
        let mut warnings = Vec::new();
        let mut expected = 1;
        for &version in self.migrations.keys() {
            if version != expected {
                warnings.push(format!(
                    "migration version gap: expected {expected}, found {version}"
                ));
            }
            expected = version + 1;
        }

        let ledger = Ledger::load(&self.engine)?;
        for version in ledger.versions() {
            if !self.migrations.contains_key(&version) {
                warnings.push(format!(
                    "ledger lists version {version} but no such migration is registered"
                ));
            }
        }
        Ok(warnings)
    }

    /// Applies every pending migration in ascending order.
    ///
    /// # Errors
    ///
    /// `MigrationFailed { version, cause }` for the first migration that
    /// fails. Earlier migrations of the run stay applied.
    pub fn run_pending_migrations(&self) -> CoreResult<MigrationRunReport> {
        self.run_until(MigrationVersion::MAX)
    }

    /// Applies pending migrations up to and including `target`.
    pub fn run_to(&self, target: MigrationVersion) -> CoreResult<MigrationRunReport> {
        self.run_until(target)
    }

    fn run_until(&self, target: MigrationVersion) -> CoreResult<MigrationRunReport> {
        let _guard = self.run_lock.lock();
        let mut ledger = Ledger::load(&self.engine)?;
        let mut report = MigrationRunReport::default();

        let pending: Vec<_> = self
            .migrations
            .range(..=target)
            .filter(|(version, _)| !ledger.contains(**version))
            .collect();

        for (&version, migration) in pending {
            tracing::info!(version, name = migration.name(), "applying migration");
            let mut ctx = MigrationContext::new(&self.engine, version);

            if let Err(cause) = migration.up(&mut ctx) {
                tracing::error!(
                    version,
                    name = migration.name(),
                    error = %cause,
                    "migration failed"
                );
                return Err(CoreError::migration_failed(version, cause));
            }

            ledger.insert(version);
            ledger
                .save(&self.engine)
                .map_err(|cause| CoreError::migration_failed(version, cause))?;

            report.applied.push(MigrationOutcome {
                version,
                name: migration.name().to_string(),
                operations: ctx.operations,
            });
        }

        report.final_version = ledger.current_version();
        tracing::info!(
            applied = report.applied.len(),
            final_version = report.final_version,
            "migrations complete"
        );
        Ok(report)
    }

    /// Reverts an applied migration and removes it from the ledger.
    ///
    /// # Errors
    ///
    /// `MigrationNotFound` if the version is not registered or not applied,
    /// `RollbackUnsupported` if it has no `down`, or the error raised by
    /// `down` itself (the ledger is then left unchanged).
    pub fn rollback_migration(&self, version: MigrationVersion) -> CoreResult<MigrationOutcome> {
        let _guard = self.run_lock.lock();
        let migration = self
            .migrations
            .get(&version)
            .ok_or(CoreError::MigrationNotFound { version })?;

        let mut ledger = Ledger::load(&self.engine)?;
        if !ledger.contains(version) {
            return Err(CoreError::MigrationNotFound { version });
        }
        if !migration.supports_rollback() {
            return Err(CoreError::RollbackUnsupported { version });
        }

        tracing::info!(version, name = migration.name(), "rolling back migration");
        let mut ctx = MigrationContext::new(&self.engine, version);
        migration.down(&mut ctx)?;

        ledger.remove(version);
        ledger.save(&self.engine)?;
        Ok(MigrationOutcome {
            version,
            name: migration.name().to_string(),
            operations: ctx.operations,
        })
    }

    /// Returns applied and pending versions.
    pub fn status(&self) -> CoreResult<MigrationStatus> {
        let ledger = Ledger::load(&self.engine)?;
        let pending_versions: Vec<MigrationVersion> = self
            .migrations
            .keys()
            .copied()
            .filter(|v| !ledger.contains(*v))
            .collect();
        let applied_versions = ledger.versions();
        Ok(MigrationStatus {
            total: self.migrations.len(),
            applied: applied_versions.len(),
            pending: pending_versions.len(),
            applied_versions,
            pending_versions,
        })
    }
}

fn info(migration: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
        description: migration.description().map(String::from),
        reversible: migration.supports_rollback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn engine() -> Arc<Engine> {
        let engine = Arc::new(Engine::in_memory(Config::default()));
        engine.initialize().unwrap();
        engine
    }

    fn noop(version: MigrationVersion) -> Box<dyn Migration> {
        Box::new(FnMigration::new(version, format!("m{version}"), |ctx| {
            ctx.custom("noop");
            Ok(())
        }))
    }

    fn failing(version: MigrationVersion) -> Box<dyn Migration> {
        Box::new(FnMigration::new(version, "broken", |_| {
            Err(CoreError::invalid_operation("intentional failure"))
        }))
    }

    #[test]
    fn register_and_list_in_version_order() {
        let mut manager = MigrationManager::new(engine());
        manager.register(noop(2)).unwrap();
        manager.register(noop(1)).unwrap();

        let versions: Vec<_> = manager.list().iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn duplicate_and_zero_versions_are_rejected() {
        let mut manager = MigrationManager::new(engine());
        manager.register(noop(1)).unwrap();
        assert!(matches!(
            manager.register(noop(1)),
            Err(CoreError::DuplicateVersion { version: 1 })
        ));
        assert!(matches!(
            manager.register(noop(0)),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn run_applies_everything_once() {
        let mut manager = MigrationManager::new(engine());
        for v in [3, 1, 2] {
            manager.register(noop(v)).unwrap();
        }

        let report = manager.run_pending_migrations().unwrap();
        assert_eq!(report.applied.len(), 3);
        assert_eq!(report.final_version, 3);

        let status = manager.status().unwrap();
        assert_eq!(status.pending, 0);
        assert_eq!(status.applied_versions, vec![1, 2, 3]);

        let again = manager.run_pending_migrations().unwrap();
        assert!(again.applied.is_empty());
    }

    #[test]
    fn failure_stops_the_run_and_keeps_earlier_versions() {
        let mut manager = MigrationManager::new(engine());
        manager.register(noop(1)).unwrap();
        manager.register(noop(2)).unwrap();
        manager.register(failing(3)).unwrap();
        manager.register(noop(4)).unwrap();

        match manager.run_pending_migrations() {
            Err(CoreError::MigrationFailed { version, cause }) => {
                assert_eq!(version, 3);
                assert!(matches!(*cause, CoreError::InvalidOperation { .. }));
            }
            other => panic!("expected MigrationFailed, got {other:?}"),
        }

        let status = manager.status().unwrap();
        assert_eq!(status.applied_versions, vec![1, 2]);
        assert_eq!(status.pending_versions, vec![3, 4]);
    }

    #[test]
    fn run_to_stops_at_the_target() {
        let mut manager = MigrationManager::new(engine());
        for v in 1..=3 {
            manager.register(noop(v)).unwrap();
        }
        let report = manager.run_to(2).unwrap();
        assert_eq!(report.final_version, 2);
        assert_eq!(manager.status().unwrap().pending_versions, vec![3]);
    }

    #[test]
    fn ledger_is_shared_across_managers() {
        let engine = engine();
        let mut first = MigrationManager::new(Arc::clone(&engine));
        first.register(noop(1)).unwrap();
        first.run_pending_migrations().unwrap();

        let mut second = MigrationManager::new(engine);
        second.register(noop(1)).unwrap();
        second.register(noop(2)).unwrap();
        assert_eq!(
            second.pending().unwrap().iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    fn rollback_runs_down_and_updates_the_ledger() {
        let engine = engine();
        let mut manager = MigrationManager::new(Arc::clone(&engine));
        manager
            .register(Box::new(
                FnMigration::new(1, "seed", |ctx| {
                    ctx.put("achievements", json!({"id": "a1", "name": "A", "category": "x"}))?;
                    ctx.seeded("achievements", 1);
                    Ok(())
                })
                .with_down(|ctx| {
                    ctx.delete("achievements", "a1")?;
                    ctx.removed("achievements", 1);
                    Ok(())
                }),
            ))
            .unwrap();
        manager.register(noop(2)).unwrap();
        manager.run_pending_migrations().unwrap();
        assert!(manager.list()[0].reversible);

        let outcome = manager.rollback_migration(1).unwrap();
        assert_eq!(outcome.operations.len(), 1);
        assert!(engine.get("achievements", "a1").unwrap().is_none());
        assert_eq!(manager.status().unwrap().applied_versions, vec![2]);

        assert!(matches!(
            manager.rollback_migration(1),
            Err(CoreError::MigrationNotFound { version: 1 })
        ));
        assert!(matches!(
            manager.rollback_migration(2),
            Err(CoreError::RollbackUnsupported { version: 2 })
        ));
        assert!(matches!(
            manager.rollback_migration(9),
            Err(CoreError::MigrationNotFound { version: 9 })
        ));
    }

    #[test]
    fn validate_reports_gaps_as_warnings() {
        let engine = engine();
        let mut manager = MigrationManager::new(Arc::clone(&engine));
        manager.register(noop(1)).unwrap();
        manager.register(noop(3)).unwrap();
        assert!(manager.validate().unwrap()[0].contains("gap"));

        let mut ledger = Ledger::default();
        ledger.insert(7);
        ledger.save(&engine).unwrap();
        assert_eq!(manager.validate().unwrap().len(), 2);
    }
}
