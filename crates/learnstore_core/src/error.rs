//! Error types for LearnStore core.

use crate::migration::MigrationVersion;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the engine, the migration manager, repositories and
/// maintenance utilities.
///
/// None of these are retried internally. Each variant carries the
/// collection, index, id or version needed to report it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage handle could not be opened.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable {
        /// Why the platform refused access.
        reason: String,
    },

    /// A byte-level storage operation failed after the store was opened.
    #[error("storage error: {0}")]
    Storage(#[from] learnstore_storage::StorageError),

    /// I/O error outside the storage backend (manifest, backup files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The collection was never declared.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// The index was never declared on the collection.
    #[error("index {index} not found on collection {collection}")]
    IndexNotFound {
        /// Collection searched.
        collection: String,
        /// Requested index name.
        index: String,
    },

    /// `add` found a record with the same id.
    #[error("duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// Collection written.
        collection: String,
        /// Conflicting id.
        id: String,
    },

    /// A unique index already maps the value to another record.
    #[error("unique index {index} on {collection} already contains {value}")]
    UniqueConstraint {
        /// Collection written.
        collection: String,
        /// Unique index violated.
        index: String,
        /// Offending key, rendered as JSON.
        value: String,
    },

    /// A record without a string `id` was handed to the engine.
    #[error("record written to {collection} has no string id")]
    MissingId {
        /// Collection written.
        collection: String,
    },

    /// A migration's `up` failed; it and every later migration stay pending.
    #[error("migration {version} failed: {cause}")]
    MigrationFailed {
        /// Version that failed.
        version: MigrationVersion,
        /// Error raised by the migration body.
        cause: Box<CoreError>,
    },

    /// The version is not registered, or not applied when rolling back.
    #[error("migration {version} not found")]
    MigrationNotFound {
        /// Requested version.
        version: MigrationVersion,
    },

    /// The migration has no `down`.
    #[error("migration {version} cannot be rolled back")]
    RollbackUnsupported {
        /// Requested version.
        version: MigrationVersion,
    },

    /// A migration with this version is already registered.
    #[error("migration version {version} already registered")]
    DuplicateVersion {
        /// Conflicting version.
        version: MigrationVersion,
    },

    /// Importing a collection from a snapshot failed.
    #[error("import of {collection} failed: {cause}")]
    ImportError {
        /// Collection being imported.
        collection: String,
        /// Underlying failure.
        cause: Box<CoreError>,
    },

    /// A record breaks a cross-entity invariant.
    #[error("integrity violation in {entity}: {reason}")]
    IntegrityViolation {
        /// Collection and id of the offending record.
        entity: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A value could not be converted to or from its stored form.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Persisted bytes do not have the expected layout.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A checksum did not match its content.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum stored alongside the data.
        expected: String,
        /// Checksum computed from the data.
        actual: String,
    },

    /// The request is not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the request was rejected.
        message: String,
    },

    /// The engine has not been initialized, or has been closed.
    #[error("store is closed")]
    StoreClosed,
}

impl CoreError {
    /// Creates a storage unavailable error.
    pub fn storage_unavailable(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Wraps the failure of migration `version`.
    pub fn migration_failed(version: MigrationVersion, cause: CoreError) -> Self {
        Self::MigrationFailed {
            version,
            cause: Box::new(cause),
        }
    }

    /// Wraps the failure to import `collection`.
    pub fn import_error(collection: impl Into<String>, cause: CoreError) -> Self {
        Self::ImportError {
            collection: collection.into(),
            cause: Box::new(cause),
        }
    }

    /// Creates an integrity violation.
    pub fn integrity_violation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for faults of the engine itself rather than of the
    /// request: storage, I/O, serialization and closed-store errors.
    #[must_use]
    pub fn is_engine_fault(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::Storage(_)
                | Self::Io(_)
                | Self::Serialization { .. }
                | Self::StoreClosed
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_failure_names_the_version() {
        let err = CoreError::migration_failed(3, CoreError::invalid_operation("boom"));
        assert_eq!(
            err.to_string(),
            "migration 3 failed: invalid operation: boom"
        );
    }

    #[test]
    fn import_error_keeps_the_cause() {
        let err = CoreError::import_error("users", CoreError::collection_not_found("users"));
        match err {
            CoreError::ImportError { collection, cause } => {
                assert_eq!(collection, "users");
                assert!(matches!(*cause, CoreError::CollectionNotFound { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn engine_faults_are_distinguished_from_request_errors() {
        assert!(CoreError::StoreClosed.is_engine_fault());
        assert!(CoreError::serialization("bad").is_engine_fault());
        assert!(!CoreError::duplicate_key("users", "u1").is_engine_fault());
        assert!(!CoreError::index_not_found("users", "nope").is_engine_fault());
    }
}
