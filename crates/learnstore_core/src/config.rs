//! Store configuration.

use crate::entity::application_schema;
use crate::schema::CollectionSchema;
use std::time::Duration;

/// Default retention for stored backups.
pub const DEFAULT_BACKUP_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name recorded in the manifest.
    pub store_name: String,

    /// Schema version of the declared collections. Opening a store whose
    /// manifest records a lower version declares the new collections and
    /// indexes; data migrations are left to the migration manager.
    pub schema_version: u32,

    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the journal after every mutation.
    pub sync_on_write: bool,

    /// Journal frames appended since the last compaction before the engine
    /// compacts on its own (0 = never).
    pub auto_vacuum_threshold: u64,

    /// How long stored backups are kept.
    pub backup_retention: Duration,

    /// Collections and indexes declared at initialization.
    pub collections: Vec<CollectionSchema>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_name: "learnstore".to_string(),
            schema_version: 1,
            create_if_missing: true,
            sync_on_write: true,
            auto_vacuum_threshold: 10_000,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            collections: application_schema(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store name.
    #[must_use]
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the automatic compaction threshold.
    #[must_use]
    pub const fn auto_vacuum_threshold(mut self, frames: u64) -> Self {
        self.auto_vacuum_threshold = frames;
        self
    }

    /// Sets the backup retention window.
    #[must_use]
    pub const fn backup_retention(mut self, retention: Duration) -> Self {
        self.backup_retention = retention;
        self
    }

    /// Replaces the declared collections.
    #[must_use]
    pub fn collections(mut self, collections: Vec<CollectionSchema>) -> Self {
        self.collections = collections;
        self
    }

    /// Declares one more collection.
    #[must_use]
    pub fn with_collection(mut self, collection: CollectionSchema) -> Self {
        self.collections.push(collection);
        self
    }
}
