//! CLI command implementations.

pub mod backup;
pub mod cleanup;
pub mod inspect;
pub mod migrate;
pub mod transfer;
pub mod vacuum;
pub mod verify;

use clap::ValueEnum;
use learnstore_core::{Config, Engine};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result of a command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Failures the CLI reports itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// `verify` found broken invariants.
    #[error("integrity check found {0} error(s)")]
    IntegrityFailed(usize),

    /// `import` or `backup restore` skipped collections.
    #[error("{0} collection(s) failed to import")]
    PartialImport(usize),
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens the store at `path`.
///
/// Only commands that write data pass `create`; the rest refuse to create
/// an empty store.
pub fn open_store(path: &Path, create: bool) -> Result<Arc<Engine>, Box<dyn std::error::Error>> {
    let config = Config::default().create_if_missing(create);
    let engine = Arc::new(Engine::open(path, config));
    engine.initialize()?;
    Ok(engine)
}
