//! Migration commands.
//!
//! The CLI runs the built-in migrations; applications with their own
//! migrations register them on a [`MigrationManager`] in process.

use super::{open_store, CommandResult};
use learnstore_core::migration::MigrationOperation;
use learnstore_core::{CoreError, MigrationManager};
use std::path::Path;
use tracing::info;

/// Show current migration status.
pub fn status(db_path: &Path) -> CommandResult {
    info!("Checking migration status for {:?}", db_path);
    let manager = MigrationManager::with_builtin(open_store(db_path, false)?)?;
    let status = manager.status()?;

    println!("Migration Status");
    println!("================");
    println!("  Registered: {}", status.total);
    println!("  Applied:    {} {:?}", status.applied, status.applied_versions);
    println!("  Pending:    {} {:?}", status.pending, status.pending_versions);

    for warning in manager.validate()? {
        println!("  ⚠ {warning}");
    }
    Ok(())
}

/// List all registered migrations.
pub fn list(db_path: &Path) -> CommandResult {
    info!("Listing migrations for {:?}", db_path);
    let manager = MigrationManager::with_builtin(open_store(db_path, false)?)?;
    let applied = manager.status()?.applied_versions;

    println!("Registered Migrations");
    println!("=====================");
    let migrations = manager.list();
    if migrations.is_empty() {
        println!("  No migrations registered.");
    }
    for migration in &migrations {
        let state = if applied.contains(&migration.version) {
            "✓ applied"
        } else {
            "○ pending"
        };
        let rollback = if migration.reversible { "" } else { ", no rollback" };
        println!("  v{}: {} [{state}{rollback}]", migration.version, migration.name);
        if let Some(desc) = &migration.description {
            println!("      {desc}");
        }
    }
    Ok(())
}

/// Run pending migrations.
pub fn run(db_path: &Path, to_version: Option<u64>, dry_run: bool) -> CommandResult {
    info!("Running migrations for {:?}", db_path);
    let manager = MigrationManager::with_builtin(open_store(db_path, true)?)?;

    let to_run: Vec<_> = manager
        .pending()?
        .into_iter()
        .filter(|m| to_version.map_or(true, |max| m.version <= max))
        .collect();

    if to_run.is_empty() {
        println!("✓ No pending migrations to run.");
        return Ok(());
    }

    if dry_run {
        println!("Dry run - would apply {} migration(s):", to_run.len());
        for migration in &to_run {
            println!("  v{}: {}", migration.version, migration.name);
        }
        return Ok(());
    }

    println!("Running {} migration(s)...", to_run.len());
    let result = match to_version {
        Some(target) => manager.run_to(target),
        None => manager.run_pending_migrations(),
    };
    let report = match result {
        Ok(report) => report,
        Err(CoreError::MigrationFailed { version, cause }) => {
            println!("\n⚠ Migration v{version} failed: {cause}");
            println!("  v{version} and later versions remain pending.");
            return Err(CoreError::MigrationFailed { version, cause }.into());
        }
        Err(err) => return Err(err.into()),
    };

    for outcome in &report.applied {
        println!("  ✓ v{}: {}", outcome.version, outcome.name);
        for operation in &outcome.operations {
            println!("      {}", describe(operation));
        }
    }
    println!(
        "\n✓ Successfully applied {} migration(s)",
        report.applied.len()
    );
    println!("  Final version: {}", report.final_version);
    Ok(())
}

/// Roll back one applied migration.
pub fn rollback(db_path: &Path, version: u64) -> CommandResult {
    info!("Rolling back migration {} for {:?}", version, db_path);
    let manager = MigrationManager::with_builtin(open_store(db_path, false)?)?;
    let outcome = manager.rollback_migration(version)?;

    println!("✓ Rolled back v{}: {}", outcome.version, outcome.name);
    for operation in &outcome.operations {
        println!("    {}", describe(operation));
    }
    Ok(())
}

fn describe(operation: &MigrationOperation) -> String {
    match operation {
        MigrationOperation::Seeded { collection, count } => {
            format!("seeded {count} record(s) into {collection}")
        }
        MigrationOperation::Updated { collection, count } => {
            format!("updated {count} record(s) in {collection}")
        }
        MigrationOperation::Removed { collection, count } => {
            format!("removed {count} record(s) from {collection}")
        }
        MigrationOperation::Custom { description } => description.clone(),
    }
}
