//! The local relational mirror.

use std::collections::BTreeMap;
use std::path::Path;

use ledgersync_codec::TaggedValue;
use ledgersync_protocol::{ChangeMessage, LogicalTimestamp};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::backend::{FileJournal, JournalBackend, MemoryJournal};
use super::journal::{Cell, Journal, JournalEntry, RecordKind};
use super::schema::{Schema, Table, Target};
use crate::error::CoreResult;

/// Mirror configuration.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Sync the journal to disk after every commit.
    pub sync_on_commit: bool,
    /// Tables to register.
    pub tables: Vec<Table>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            tables: Table::ALL.to_vec(),
        }
    }
}

impl MirrorConfig {
    /// Restricts the registered tables.
    #[must_use]
    pub fn with_tables(mut self, tables: &[Table]) -> Self {
        self.tables = tables.to_vec();
        self
    }
}

/// One mirrored row, keyed by its id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MirrorRow {
    id: String,
    values: BTreeMap<String, TaggedValue>,
}

impl MirrorRow {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            values: BTreeMap::new(),
        }
    }

    /// Row id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Value of `field`, if it was ever set.
    pub fn get(&self, field: &str) -> Option<&TaggedValue> {
        self.values.get(field)
    }

    /// All set fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TaggedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if the row carries a truthy `tombstone`.
    ///
    /// Deletes arrive as a tombstone column set to 1; the row stays in place.
    pub fn is_tombstoned(&self) -> bool {
        matches!(
            self.values.get("tombstone"),
            Some(TaggedValue::Integer(1) | TaggedValue::Bool(true))
        )
    }
}

#[derive(Debug, Default)]
struct MirrorState {
    tables: BTreeMap<Table, BTreeMap<String, MirrorRow>>,
    metadata: BTreeMap<String, TaggedValue>,
    cursor: Option<LogicalTimestamp>,
}

impl MirrorState {
    fn apply(&mut self, entry: &JournalEntry) {
        for cell in &entry.cells {
            match cell.target {
                Target::Prefs => {
                    self.metadata.insert(cell.row.clone(), cell.value.clone());
                }
                Target::Table(table) => {
                    self.tables
                        .entry(table)
                        .or_default()
                        .entry(cell.row.clone())
                        .or_insert_with(|| MirrorRow::new(&cell.row))
                        .values
                        .insert(cell.field.clone(), cell.value.clone());
                }
            }
        }
        if let Some(cursor) = &entry.cursor {
            self.cursor = Some(cursor.clone());
        }
    }

    fn snapshot(&self) -> JournalEntry {
        let mut cells = Vec::new();
        for (key, value) in &self.metadata {
            cells.push(Cell {
                target: Target::Prefs,
                row: key.clone(),
                field: String::new(),
                value: value.clone(),
            });
        }
        for (&table, rows) in &self.tables {
            for row in rows.values() {
                for (field, value) in &row.values {
                    cells.push(Cell {
                        target: Target::Table(table),
                        row: row.id.clone(),
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        JournalEntry {
            cells,
            cursor: self.cursor.clone(),
        }
    }
}

/// Transactional mirror of the remote tables.
///
/// # Invariants
///
/// - A batch is resolved in full before anything is written; an unknown
///   table or column leaves the mirror untouched
/// - A batch is journaled before it becomes visible to readers
/// - Within a batch, later changes to a cell overwrite earlier ones
///   (list order, not timestamp order)
#[derive(Debug)]
pub struct MirrorStore {
    schema: Schema,
    state: RwLock<MirrorState>,
    journal: Mutex<Journal>,
}

impl MirrorStore {
    /// Opens a mirror over `backend`, replaying its journal.
    ///
    /// # Errors
    ///
    /// Fails on an invalid schema, journal corruption, or I/O errors.
    pub fn open(backend: Box<dyn JournalBackend>, config: MirrorConfig) -> CoreResult<Self> {
        let schema = Schema::with_tables(&config.tables)?;
        let mut journal = Journal::new(backend, config.sync_on_commit);

        let mut state = MirrorState::default();
        let records = journal.replay()?;
        for (kind, entry) in &records {
            if *kind == RecordKind::Snapshot {
                state = MirrorState::default();
            }
            state.apply(entry);
        }
        info!(
            records = records.len(),
            cursor = ?state.cursor.as_ref().map(ToString::to_string),
            "mirror opened"
        );

        Ok(Self {
            schema,
            state: RwLock::new(state),
            journal: Mutex::new(journal),
        })
    }

    /// Opens a file-backed mirror.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MirrorLocked`](crate::CoreError::MirrorLocked) if
    /// another process has the file open, and see [`MirrorStore::open`].
    pub fn open_file(path: &Path, config: MirrorConfig) -> CoreResult<Self> {
        Self::open(Box::new(FileJournal::open(path)?), config)
    }

    /// Opens an empty in-memory mirror with every table registered.
    ///
    /// # Errors
    ///
    /// See [`MirrorStore::open`].
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(Box::new(MemoryJournal::new()), MirrorConfig::default())
    }

    /// The table registry.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolves every change to a cell without touching the mirror.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`](crate::CoreError::TableNotFound)
    /// or [`CoreError::ColumnNotFound`](crate::CoreError::ColumnNotFound) for
    /// the first change that does not resolve.
    pub fn resolve(&self, changes: &[ChangeMessage]) -> CoreResult<Vec<Cell>> {
        changes
            .iter()
            .map(|change| {
                let target = self.schema.resolve(&change.dataset)?;
                let field = match target {
                    Target::Prefs => String::new(),
                    Target::Table(table) => self.schema.field(table, &change.column)?.to_string(),
                };
                Ok(Cell {
                    target,
                    row: change.row.clone(),
                    field,
                    value: change.value.clone(),
                })
            })
            .collect()
    }

    /// Applies `changes` as one atomic batch.
    ///
    /// # Errors
    ///
    /// See [`MirrorStore::apply_with_cursor`].
    pub fn apply(&self, changes: &[ChangeMessage]) -> CoreResult<usize> {
        self.apply_with_cursor(changes, None)
    }

    /// Applies `changes` as one atomic batch and, if given, moves the cursor
    /// in the same commit.
    ///
    /// Returns the number of cells written.
    ///
    /// # Errors
    ///
    /// Schema errors and journal write errors abort the batch; the mirror
    /// keeps its previous state.
    pub fn apply_with_cursor(
        &self,
        changes: &[ChangeMessage],
        cursor: Option<&LogicalTimestamp>,
    ) -> CoreResult<usize> {
        let cells = self.resolve(changes)?;
        if cells.is_empty() && cursor.is_none() {
            return Ok(0);
        }

        let entry = JournalEntry {
            cells,
            cursor: cursor.cloned(),
        };
        let kind = if entry.cells.is_empty() {
            RecordKind::Cursor
        } else {
            RecordKind::Batch
        };

        // Holding the journal lock serializes writers.
        let mut journal = self.journal.lock();
        journal.append(kind, &entry)?;
        self.state.write().apply(&entry);

        debug!(
            cells = entry.cells.len(),
            cursor = ?entry.cursor.as_ref().map(ToString::to_string),
            "batch committed"
        );
        Ok(entry.cells.len())
    }

    /// Moves the cursor without changing any cells.
    ///
    /// # Errors
    ///
    /// Fails on journal write errors.
    pub fn set_cursor(&self, cursor: &LogicalTimestamp) -> CoreResult<()> {
        self.apply_with_cursor(&[], Some(cursor)).map(|_| ())
    }

    /// Last consumed remote timestamp.
    pub fn cursor(&self) -> Option<LogicalTimestamp> {
        self.state.read().cursor.clone()
    }

    /// Copy of a row.
    pub fn row(&self, table: Table, id: &str) -> Option<MirrorRow> {
        self.state
            .read()
            .tables
            .get(&table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Value of one cell, by field name.
    pub fn value(&self, table: Table, id: &str, field: &str) -> Option<TaggedValue> {
        self.state
            .read()
            .tables
            .get(&table)
            .and_then(|rows| rows.get(id))
            .and_then(|row| row.get(field))
            .cloned()
    }

    /// Copies of every row of `table`, ordered by id.
    pub fn rows(&self, table: Table) -> Vec<MirrorRow> {
        self.state
            .read()
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: Table) -> usize {
        self.state.read().tables.get(&table).map_or(0, BTreeMap::len)
    }

    /// A preference value.
    pub fn metadata(&self, key: &str) -> Option<TaggedValue> {
        self.state.read().metadata.get(key).cloned()
    }

    /// Every preference value.
    pub fn metadata_entries(&self) -> BTreeMap<String, TaggedValue> {
        self.state.read().metadata.clone()
    }

    /// Rewrites the journal as a single snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Fails on journal write errors; the old journal is kept.
    pub fn compact(&self) -> CoreResult<()> {
        let mut journal = self.journal.lock();
        let before = journal.size()?;
        let snapshot = self.state.read().snapshot();
        journal.rewrite(&snapshot)?;
        info!(before, after = journal.size()?, "journal compacted");
        Ok(())
    }

    /// Journal size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.lock().size()
    }
}
