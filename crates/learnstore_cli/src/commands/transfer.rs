//! Export and import through backup files.

use super::{open_store, CliError, CommandResult};
use learnstore_core::{ImportOptions, Maintenance};
use std::path::Path;

/// Writes the named collections, or all of them, to `file`.
pub fn export(db_path: &Path, file: &Path, collections: Option<&[String]>) -> CommandResult {
    let maintenance = Maintenance::new(open_store(db_path, false)?);
    let names: Option<Vec<&str>> =
        collections.map(|names| names.iter().map(String::as_str).collect());

    let summary = maintenance.write_backup_file(file, names.as_deref())?;
    println!(
        "✓ Exported {} record(s) from {} collection(s) to {}",
        summary.records, summary.collections, summary.key
    );
    Ok(())
}

/// Imports `file` into the store.
pub fn import(db_path: &Path, file: &Path, clear: bool, skip_errors: bool) -> CommandResult {
    let backup = Maintenance::read_backup_file(file)?;
    let maintenance = Maintenance::new(open_store(db_path, true)?);
    let options = ImportOptions::new()
        .clear_existing(clear)
        .skip_errors(skip_errors);

    let report = maintenance.import_data(&backup.collections, &options)?;
    for (collection, count) in &report.collections {
        println!("  {collection:<20} {count} record(s)");
    }
    for failure in &report.errors {
        println!("  ✗ {}: {}", failure.collection, failure.message);
    }
    println!(
        "✓ Imported {} record(s) from {} (taken {})",
        report.imported,
        file.display(),
        backup.created_at
    );

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::PartialImport(report.errors.len()).into())
    }
}
