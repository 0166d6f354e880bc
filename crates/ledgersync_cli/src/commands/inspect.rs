//! Inspect command implementation.

use crate::Format;
use ledgersync_core::mirror::{scan, FileJournal, JournalBackend};
use ledgersync_core::{MirrorConfig, MirrorStore, Table};
use serde::Serialize;
use std::path::Path;

/// Mirror inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Number of journal records.
    pub record_count: usize,
    /// Whether a partial record trails the journal.
    pub torn_tail: bool,
    /// Last consumed remote timestamp.
    pub cursor: Option<String>,
    /// Number of preference keys.
    pub metadata_count: usize,
    /// Non-empty tables.
    pub tables: Vec<TableStats>,
    /// Journal size after compaction, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted_size: Option<u64>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: &'static str,
    /// Number of rows.
    pub rows: usize,
    /// Rows with a truthy tombstone.
    pub tombstoned: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, compact: bool, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, compact)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Reads the journal at `path` and summarizes it.
pub fn inspect(path: &Path, compact: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {}", path.display()).into());
    }

    // Scan the raw records first; opening the store truncates a torn tail.
    let (journal_size, record_count, torn_tail) = {
        let journal = FileJournal::open(path)?;
        let scanned = scan(&journal.read_all()?)?;
        (journal.size()?, scanned.records.len(), scanned.torn_tail)
    };

    let store = MirrorStore::open_file(path, MirrorConfig::default())?;
    let tables = Table::ALL
        .iter()
        .filter_map(|&table| {
            let rows = store.rows(table);
            (!rows.is_empty()).then(|| TableStats {
                name: table.name(),
                rows: rows.len(),
                tombstoned: rows.iter().filter(|r| r.is_tombstoned()).count(),
            })
        })
        .collect();

    let compacted_size = if compact {
        store.compact()?;
        Some(store.journal_size()?)
    } else {
        None
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size,
        record_count,
        torn_tail,
        cursor: store.cursor().map(|c| c.to_string()),
        metadata_count: store.metadata_entries().len(),
        tables,
        compacted_size,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Mirror Journal");
    println!("==============");
    println!("Path:        {}", result.path);
    println!("Size:        {} bytes", result.journal_size);
    println!("Records:     {}", result.record_count);
    if result.torn_tail {
        println!("Torn tail:   yes (dropped on open)");
    }
    println!(
        "Cursor:      {}",
        result.cursor.as_deref().unwrap_or("(none)")
    );
    println!("Preferences: {}", result.metadata_count);

    if !result.tables.is_empty() {
        println!();
        println!("{:<24} {:>10} {:>12}", "Table", "Rows", "Tombstoned");
        println!("{:-<24} {:-<10} {:-<12}", "", "", "");
        for stats in &result.tables {
            println!(
                "{:<24} {:>10} {:>12}",
                stats.name, stats.rows, stats.tombstoned
            );
        }
    }

    if let Some(size) = result.compacted_size {
        println!();
        println!("Compacted:   {} -> {} bytes", result.journal_size, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::ChangeMessage;
    use tempfile::tempdir;

    #[test]
    fn summarizes_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.journal");
        {
            let store = MirrorStore::open_file(&path, MirrorConfig::default()).unwrap();
            store
                .apply(&[
                    ChangeMessage::new("payees", "p1", "name", "Grocer"),
                    ChangeMessage::new("payees", "p2", "tombstone", 1i64),
                    ChangeMessage::new("prefs", "budgetName", "", "Home"),
                ])
                .unwrap();
            store
                .apply(&[ChangeMessage::new("payees", "p1", "name", "Grocer Co")])
                .unwrap();
        }

        let result = inspect(&path, true).unwrap();
        assert_eq!(result.record_count, 2);
        assert!(!result.torn_tail);
        assert_eq!(result.metadata_count, 1);
        assert_eq!(result.cursor, None);
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].name, "payees");
        assert_eq!(result.tables[0].rows, 2);
        assert_eq!(result.tables[0].tombstoned, 1);
        assert!(result.compacted_size.is_some());
    }

    #[test]
    fn missing_journal() {
        let dir = tempdir().unwrap();
        assert!(inspect(&dir.path().join("nope.journal"), false).is_err());
    }
}
