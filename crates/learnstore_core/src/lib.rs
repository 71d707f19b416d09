//! # LearnStore Core
//!
//! Client-resident document store for the LearnStore learning app.
//!
//! This crate provides:
//! - [`Engine`]: collections of JSON records with secondary indexes, an
//!   expiring cache and a crash-safe journal
//! - [`migration`]: versioned data migrations with a persisted ledger
//! - [`repository`]: typed CRUD and index finders per entity
//! - [`maintenance`]: export/import, backups, integrity checks and orphan
//!   cleanup
//!
//! ## Startup
//!
//! ```rust
//! use learnstore_core::entity::User;
//! use learnstore_core::migration::MigrationManager;
//! use learnstore_core::{Config, Engine, EventBus, Maintenance, Repositories};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(Engine::in_memory(Config::default()));
//! engine.initialize()?;
//!
//! let migrations = MigrationManager::with_builtin(Arc::clone(&engine))?;
//! migrations.run_pending_migrations()?;
//!
//! let repos = Repositories::new(Arc::clone(&engine), EventBus::new());
//! let ann = repos.users.create(User {
//!     email: "ann@example.com".into(),
//!     username: "ann".into(),
//!     ..User::default()
//! })?;
//! let found = repos.users.find_by_email("ann@example.com")?;
//! assert_eq!(found.map(|u| u.meta.id), Some(ann.meta.id));
//!
//! assert!(Maintenance::new(engine).validate_data_integrity().valid);
//! # Ok::<(), learnstore_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dir;
pub mod engine;
pub mod entity;
mod error;
pub mod index;
pub mod journal;
pub mod maintenance;
pub mod manifest;
pub mod metrics;
pub mod migration;
pub mod query;
pub mod repository;
pub mod schema;
mod types;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::Config;
pub use engine::{Engine, EngineStats, VacuumReport};
pub use entity::{Entity, EntityKind, RecordMeta};
pub use error::{CoreError, CoreResult};
pub use maintenance::{ImportOptions, Maintenance, Snapshot};
pub use migration::{Migration, MigrationManager, MigrationStatus, MigrationVersion};
pub use query::{Direction, IndexFilter, KeyRange, QueryOptions};
pub use repository::{EventBus, FindOptions, Repositories, Repository, RepositoryObserver};
pub use schema::{CollectionSchema, IndexDefinition, KeyPath};
pub use types::{
    format_iso, new_id, now_iso, now_millis, parse_iso, IntoRecord, Record, CREATED_AT_FIELD,
    ID_FIELD, UPDATED_AT_FIELD,
};
