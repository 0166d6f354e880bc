//! Session states and per-session bookkeeping.

use ledgersync_protocol::LogicalTimestamp;
use std::time::{Duration, Instant};

/// The current state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync in flight.
    Idle,
    /// A request is out; waiting for the response.
    Requesting,
    /// Decoding, decrypting and applying a response.
    Applying,
    /// The last sync hit an unrecoverable error. Cleared by `reset`.
    Failed,
}

impl SyncState {
    /// Returns true while a sync is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Requesting | SyncState::Applying)
    }

    /// Returns true if a new sync may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }

    /// Returns true if the session may move from `self` to `to`.
    pub fn can_transition_to(&self, to: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, to),
            (Idle, Requesting)
                | (Requesting, Applying)
                | (Applying, Idle)
                | (Requesting | Applying, Failed)
                | (Failed, Idle)
        )
    }
}

/// Statistics about sync calls.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync calls that completed.
    pub cycles_completed: u64,
    /// Sync calls that ended in `Failed`.
    pub failures: u64,
    /// Envelopes uploaded.
    pub envelopes_sent: u64,
    /// Remote changes applied to the mirror.
    pub changes_applied: u64,
    /// Duration of the last completed sync.
    pub last_duration: Option<Duration>,
    /// When the last sync completed.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

/// Result of one successful sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Envelopes uploaded.
    pub sent: usize,
    /// Remote changes applied.
    pub applied: usize,
    /// Cursor after the call.
    pub cursor: Option<LogicalTimestamp>,
    /// Opaque server checkpoint.
    pub merkle: String,
}
