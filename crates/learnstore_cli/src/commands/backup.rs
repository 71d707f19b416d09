//! Backups kept inside the store.

use super::{open_store, CliError, CommandResult};
use learnstore_core::{ImportOptions, Maintenance};
use std::path::Path;

/// Snapshots every collection.
pub fn create(db_path: &Path) -> CommandResult {
    let maintenance = Maintenance::new(open_store(db_path, false)?);
    let key = maintenance.create_backup()?;
    let retention = maintenance.engine().config().backup_retention;
    println!("✓ Backup created: {key}");
    println!("  Expires in {} day(s)", retention.as_secs() / 86_400);
    Ok(())
}

/// Lists unexpired backups.
pub fn list(db_path: &Path) -> CommandResult {
    let maintenance = Maintenance::new(open_store(db_path, false)?);
    let backups = maintenance.list_backups()?;

    if backups.is_empty() {
        println!("No backups stored.");
        return Ok(());
    }
    println!("Stored Backups");
    println!("==============");
    for backup in &backups {
        println!(
            "  {}  {}  {} record(s) in {} collection(s)",
            backup.key, backup.created_at, backup.records, backup.collections
        );
    }
    Ok(())
}

/// Restores a backup by key.
pub fn restore(db_path: &Path, key: &str, clear: bool) -> CommandResult {
    let maintenance = Maintenance::new(open_store(db_path, false)?);
    let report = maintenance.restore_backup(key, &ImportOptions::new().clear_existing(clear))?;
    println!("✓ Restored {} record(s) from {key}", report.imported);

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::PartialImport(report.errors.len()).into())
    }
}
