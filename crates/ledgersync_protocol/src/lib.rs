//! # ledgersync protocol
//!
//! Sync protocol types for ledgersync.
//!
//! This crate provides:
//! - Wire messages (`ChangeMessage`, `MessageEnvelope`, `SyncRequest`, `SyncResponse`)
//! - `LogicalTimestamp` and the `HulcClock` that issues them
//! - JSON encryption metadata and key info
//! - The `Outbox` of envelopes waiting for upload
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod messages;
mod meta;
mod outbox;

pub use clock::{generate_node_id, wall_millis, HulcClock, LogicalTimestamp, MAX_MILLIS, NODE_ID_LEN};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ChangeMessage, EncryptedData, MessageEnvelope, SyncRequest, SyncResponse};
pub use meta::{encode_base64, EncryptionMeta, KeyInfo, KeyTest, ALGORITHM};
pub use outbox::Outbox;

pub use ledgersync_codec::{CodecError, Decode, Encode, TaggedValue};
