//! Local mirror of the remote tables.
//!
//! Every committed batch is appended to a checksummed journal before it
//! becomes visible; opening a mirror replays that journal.

mod backend;
mod journal;
mod schema;
mod store;

pub use backend::{FileJournal, JournalBackend, MemoryJournal};
pub use journal::{
    compute_crc32, encode_record, scan, Cell, Journal, JournalEntry, RecordKind, Scan,
    JOURNAL_MAGIC, JOURNAL_VERSION,
};
pub use schema::{ColumnDefs, Schema, Table, Target, PREFS_DATASET};
pub use store::{MirrorConfig, MirrorRow, MirrorStore};
