//! # Ledgersync Engine
//!
//! Client-side sync sessions for ledgersync.
//!
//! This crate provides:
//! - The session state machine (idle → requesting → applying → idle)
//! - Cursor tracking through a [`ChangeApplier`]
//! - Key unlock and key-mismatch detection for encrypted files
//! - The transport boundary and its HTTP implementation
//!
//! ## Model
//!
//! Each sync uploads the queued local envelopes and receives every remote
//! envelope newer than the cursor. The response is decrypted, decoded and
//! applied as one atomic batch; then the cursor moves to the last received
//! timestamp.
//!
//! ## Key Invariants
//!
//! - The server delivers changes in resolved order; the client applies them
//!   in list order and never re-sorts by timestamp
//! - A batch is applied entirely or not at all
//! - Re-running a sync from the same cursor is idempotent
//! - Errors are surfaced, never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod error;
mod http;
mod session;
mod state;
mod transport;

pub use applier::{ChangeApplier, MemoryApplier, MirrorApplier};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, HttpTransport, FILE_ID_HEADER, SYNC_CONTENT_TYPE,
    TOKEN_HEADER,
};
pub use session::SyncSession;
pub use state::{SyncOutcome, SyncState, SyncStats};
pub use transport::{MockTransport, SyncTransport};
