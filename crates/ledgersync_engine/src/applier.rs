//! Destinations for decoded change batches.

use crate::error::SyncResult;
use ledgersync_core::MirrorStore;
use ledgersync_protocol::{ChangeMessage, LogicalTimestamp};
use parking_lot::RwLock;
use std::sync::Arc;

/// Applies change batches and remembers the sync cursor.
pub trait ChangeApplier: Send + Sync {
    /// Applies `changes` as one atomic batch, moving the cursor with it when
    /// one is given. Returns the number of changes applied.
    fn apply_batch(
        &self,
        changes: &[ChangeMessage],
        cursor: Option<&LogicalTimestamp>,
    ) -> SyncResult<usize>;

    /// Last consumed remote timestamp.
    fn cursor(&self) -> SyncResult<Option<LogicalTimestamp>>;
}

/// An applier backed by a [`MirrorStore`].
///
/// The cursor lives in the mirror's journal, so it survives restarts
/// together with the rows it describes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ledgersync_core::MirrorStore;
/// use ledgersync_engine::{ChangeApplier, MirrorApplier};
/// use ledgersync_protocol::ChangeMessage;
///
/// let store = Arc::new(MirrorStore::in_memory().unwrap());
/// let applier = MirrorApplier::new(Arc::clone(&store));
/// applier
///     .apply_batch(&[ChangeMessage::new("notes", "n1", "note", "hello")], None)
///     .unwrap();
/// assert_eq!(store.row_count(ledgersync_core::Table::Notes), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MirrorApplier {
    store: Arc<MirrorStore>,
}

impl MirrorApplier {
    /// Wraps a mirror store.
    pub fn new(store: Arc<MirrorStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }
}

impl ChangeApplier for MirrorApplier {
    fn apply_batch(
        &self,
        changes: &[ChangeMessage],
        cursor: Option<&LogicalTimestamp>,
    ) -> SyncResult<usize> {
        Ok(self.store.apply_with_cursor(changes, cursor)?)
    }

    fn cursor(&self) -> SyncResult<Option<LogicalTimestamp>> {
        Ok(self.store.cursor())
    }
}

/// An in-memory applier for testing. Records every batch it receives.
#[derive(Debug, Default)]
pub struct MemoryApplier {
    batches: RwLock<Vec<Vec<ChangeMessage>>>,
    cursor: RwLock<Option<LogicalTimestamp>>,
}

impl MemoryApplier {
    /// Creates an empty applier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches applied so far, in order.
    pub fn batches(&self) -> Vec<Vec<ChangeMessage>> {
        self.batches.read().clone()
    }

    /// Total number of changes applied.
    pub fn applied_count(&self) -> usize {
        self.batches.read().iter().map(Vec::len).sum()
    }
}

impl ChangeApplier for MemoryApplier {
    fn apply_batch(
        &self,
        changes: &[ChangeMessage],
        cursor: Option<&LogicalTimestamp>,
    ) -> SyncResult<usize> {
        if !changes.is_empty() {
            self.batches.write().push(changes.to_vec());
        }
        if let Some(cursor) = cursor {
            *self.cursor.write() = Some(cursor.clone());
        }
        Ok(changes.len())
    }

    fn cursor(&self) -> SyncResult<Option<LogicalTimestamp>> {
        Ok(self.cursor.read().clone())
    }
}
