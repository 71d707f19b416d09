//! LearnStore CLI
//!
//! Command-line tools for LearnStore store directories.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and declared indexes
//! - `verify` - Validate data integrity
//! - `migrate` - Show, run or roll back data migrations
//! - `export` / `import` - Move snapshots through checksummed files
//! - `backup` - Create, list and restore backups kept in the store
//! - `cleanup` - Delete records whose owning user no longer exists
//! - `vacuum` - Compact the journal

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LearnStore command-line store tools.
#[derive(Parser)]
#[command(name = "learnstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// List declared indexes per collection
        #[arg(short, long)]
        indexes: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate data integrity; exits non-zero when errors are found
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Manage data migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Export collections to a backup file
    Export {
        /// Destination file
        file: PathBuf,

        /// Comma-separated collections (default: all)
        #[arg(short, long, value_delimiter = ',')]
        collections: Option<Vec<String>>,
    },

    /// Import a backup file
    Import {
        /// Source file
        file: PathBuf,

        /// Clear each collection before importing it
        #[arg(long)]
        clear: bool,

        /// Skip collections that fail instead of aborting
        #[arg(long)]
        skip_errors: bool,
    },

    /// Manage backups stored in the store itself
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Delete records whose owning user no longer exists
    Cleanup {
        /// Only report what would be deleted
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Compact the journal
    Vacuum,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Show applied and pending versions
    Status,
    /// List registered migrations
    List,
    /// Apply pending migrations
    Run {
        /// Stop after this version
        #[arg(long)]
        to: Option<u64>,

        /// Only show what would run
        #[arg(short, long)]
        dry_run: bool,
    },
    /// Roll back one applied migration
    Rollback {
        /// Version to roll back
        version: u64,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Snapshot every collection into the store
    Create,
    /// List unexpired backups
    List,
    /// Restore a backup by key
    Restore {
        /// Backup key, as printed by `backup list`
        key: String,

        /// Clear each collection before restoring it
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("LearnStore CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("LearnStore Core v{}", learnstore_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Store path required (--path <dir>)")?;
    match cli.command {
        Commands::Inspect { indexes, format } => commands::inspect::run(&path, indexes, format)?,
        Commands::Verify { format } => commands::verify::run(&path, format)?,
        Commands::Migrate { action } => match action {
            MigrateAction::Status => commands::migrate::status(&path)?,
            MigrateAction::List => commands::migrate::list(&path)?,
            MigrateAction::Run { to, dry_run } => commands::migrate::run(&path, to, dry_run)?,
            MigrateAction::Rollback { version } => commands::migrate::rollback(&path, version)?,
        },
        Commands::Export { file, collections } => {
            commands::transfer::export(&path, &file, collections.as_deref())?;
        }
        Commands::Import {
            file,
            clear,
            skip_errors,
        } => commands::transfer::import(&path, &file, clear, skip_errors)?,
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::backup::create(&path)?,
            BackupAction::List => commands::backup::list(&path)?,
            BackupAction::Restore { key, clear } => commands::backup::restore(&path, &key, clear)?,
        },
        Commands::Cleanup { dry_run } => commands::cleanup::run(&path, dry_run)?,
        Commands::Vacuum => commands::vacuum::run(&path)?,
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_migrate_run() {
        let cli = Cli::parse_from(["learnstore", "--path", "db", "migrate", "run", "--to", "2"]);
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                action: MigrateAction::Run {
                    to: Some(2),
                    dry_run: false
                }
            }
        ));
    }

    #[test]
    fn parses_export_collections() {
        let cli = Cli::parse_from([
            "learnstore",
            "export",
            "out.json",
            "--collections",
            "users,progress",
        ]);
        match cli.command {
            Commands::Export { collections, .. } => {
                assert_eq!(
                    collections,
                    Some(vec!["users".to_string(), "progress".to_string()])
                );
            }
            _ => panic!("expected export"),
        }
    }
}
