//! Orphan cleanup command.

use super::{open_store, CommandResult};
use learnstore_core::Maintenance;
use std::path::Path;

/// Deletes, or with `dry_run` lists, records whose owning user is gone.
pub fn run(db_path: &Path, dry_run: bool) -> CommandResult {
    let maintenance = Maintenance::new(open_store(db_path, false)?);

    if dry_run {
        let orphans = maintenance.find_orphans()?;
        let total: usize = orphans.values().map(Vec::len).sum();
        println!("Dry run - would delete {total} orphaned record(s):");
        for (collection, ids) in orphans.iter().filter(|(_, ids)| !ids.is_empty()) {
            println!("  {collection}: {}", ids.join(", "));
        }
        return Ok(());
    }

    let report = maintenance.cleanup_orphaned_data();
    for (collection, count) in report.details.iter().filter(|(_, count)| **count > 0) {
        println!("  {collection:<20} {count} deleted");
    }
    for error in &report.errors {
        println!("  ✗ {error}");
    }
    println!("✓ Deleted {} orphaned record(s)", report.cleaned);
    Ok(())
}
