//! Vacuum command implementation.

use super::{open_store, CommandResult};
use std::path::Path;

/// Compacts the journal.
pub fn run(db_path: &Path) -> CommandResult {
    let engine = open_store(db_path, false)?;
    let report = engine.vacuum()?;

    println!("Vacuum Results");
    println!("==============");
    println!(
        "  Journal frames:    {} -> {}",
        report.frames_before, report.frames_after
    );
    println!(
        "  Journal bytes:     {} -> {}",
        report.bytes_before, report.bytes_after
    );
    println!("  Expired cache:     {} dropped", report.expired_cache_entries);

    let saved = report.bytes_before.saturating_sub(report.bytes_after);
    println!("\n✓ Reclaimed {saved} bytes");
    Ok(())
}
