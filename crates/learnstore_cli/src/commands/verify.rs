//! Verify command implementation.

use super::{open_store, CliError, CommandResult, OutputFormat};
use learnstore_core::maintenance::IntegrityIssue;
use learnstore_core::Maintenance;
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path, format: OutputFormat) -> CommandResult {
    let engine = open_store(path, false)?;
    let report = Maintenance::new(engine).validate_data_integrity();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Verifying store at {}", path.display());
            println!();
            print_issues("Errors", &report.errors);
            print_issues("Warnings", &report.warnings);
            if report.valid {
                println!("✓ Integrity check passed ({} warning(s))", report.warnings.len());
            } else {
                println!("✗ Integrity check failed");
            }
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(CliError::IntegrityFailed(report.errors.len()).into())
    }
}

fn print_issues(title: &str, issues: &[IntegrityIssue]) {
    if issues.is_empty() {
        return;
    }
    println!("{title}:");
    for issue in issues {
        println!("  {}: {}", issue.entity, issue.reason);
    }
    println!();
}
