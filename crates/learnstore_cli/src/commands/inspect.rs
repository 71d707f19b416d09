//! Inspect command implementation.

use super::{open_store, CommandResult, OutputFormat};
use learnstore_core::EngineStats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Engine statistics.
    pub stats: EngineStats,
    /// Declared indexes per collection (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<BTreeMap<String, Vec<IndexInfo>>>,
}

/// One declared index.
#[derive(Debug, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed fields.
    pub fields: Vec<String>,
    /// Whether values must be unique.
    pub unique: bool,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_indexes: bool, format: OutputFormat) -> CommandResult {
    let engine = open_store(path, false)?;
    let stats = engine.stats()?;

    let indexes = if show_indexes {
        let mut by_collection = BTreeMap::new();
        for name in engine.collection_names()? {
            let schema = engine.schema(&name)?;
            let infos: Vec<IndexInfo> = schema
                .indexes
                .iter()
                .map(|index| IndexInfo {
                    name: index.name.clone(),
                    fields: index.key_path.fields().into_iter().map(str::to_string).collect(),
                    unique: index.unique,
                })
                .collect();
            by_collection.insert(name, infos);
        }
        Some(by_collection)
    } else {
        None
    };

    let result = InspectResult {
        path: path.display().to_string(),
        stats,
        indexes,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let stats = &result.stats;
    println!("LearnStore Inspection");
    println!("=====================");
    println!();
    println!("Path:           {}", result.path);
    println!("Store:          {}", stats.store_name);
    println!("Schema version: {}", stats.schema_version);
    println!();
    println!("Journal:");
    println!("  Frames: {}", stats.journal_frames);
    println!("  Size:   {}", format_size(stats.journal_bytes));
    println!();
    println!("Collections:");
    for (name, count) in &stats.collections {
        println!("  {name:<20} {count} record(s)");
        if let Some(indexes) = result.indexes.as_ref().and_then(|all| all.get(name)) {
            for index in indexes {
                let unique = if index.unique { " unique" } else { "" };
                println!("      index {} [{}]{unique}", index.name, index.fields.join(", "));
            }
        }
    }
    println!();
    println!("Cache entries: {}", stats.cache_entries);
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
