//! The applied-migration ledger.
//!
//! One global, sorted list of applied versions kept in a non-expiring cache
//! entry, so it is journaled and compacted like any other engine state.

use super::MigrationVersion;
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::collections::BTreeSet;

/// Cache key holding the ledger.
pub const LEDGER_KEY: &str = "migrations:applied";

/// Versions already applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    applied: BTreeSet<MigrationVersion>,
}

impl Ledger {
    /// Reads the ledger; a store that never ran a migration has an empty one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the stored value is not a list of versions.
    pub fn load(engine: &Engine) -> CoreResult<Self> {
        let Some(value) = engine.get_cache(LEDGER_KEY)? else {
            return Ok(Self::default());
        };
        let versions: Vec<MigrationVersion> = serde_json::from_value(value)
            .map_err(|e| CoreError::invalid_format(format!("migration ledger: {e}")))?;
        Ok(Self {
            applied: versions.into_iter().collect(),
        })
    }

    /// Persists the ledger.
    pub fn save(&self, engine: &Engine) -> CoreResult<()> {
        let versions: Vec<Value> = self.applied.iter().map(|v| Value::from(*v)).collect();
        engine.set_cache(LEDGER_KEY, Value::Array(versions), None)
    }

    /// Returns true if `version` has been applied.
    #[must_use]
    pub fn contains(&self, version: MigrationVersion) -> bool {
        self.applied.contains(&version)
    }

    pub(crate) fn insert(&mut self, version: MigrationVersion) {
        self.applied.insert(version);
    }

    pub(crate) fn remove(&mut self, version: MigrationVersion) -> bool {
        self.applied.remove(&version)
    }

    /// Applied versions, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<MigrationVersion> {
        self.applied.iter().copied().collect()
    }

    /// Highest applied version, 0 if none.
    #[must_use]
    pub fn current_version(&self) -> MigrationVersion {
        self.applied.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn engine() -> Engine {
        let engine = Engine::in_memory(Config::default());
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn empty_store_has_empty_ledger() {
        let ledger = Ledger::load(&engine()).unwrap();
        assert!(ledger.versions().is_empty());
        assert_eq!(ledger.current_version(), 0);
    }

    #[test]
    fn ledger_round_trips_sorted() {
        let engine = engine();
        let mut ledger = Ledger::default();
        ledger.insert(3);
        ledger.insert(1);
        ledger.save(&engine).unwrap();

        assert_eq!(engine.get_cache(LEDGER_KEY).unwrap(), Some(json!([1, 3])));
        let loaded = Ledger::load(&engine).unwrap();
        assert_eq!(loaded.versions(), vec![1, 3]);
        assert_eq!(loaded.current_version(), 3);
    }

    #[test]
    fn corrupt_ledger_is_reported() {
        let engine = engine();
        engine.set_cache(LEDGER_KEY, json!("one"), None).unwrap();
        assert!(matches!(
            Ledger::load(&engine),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
