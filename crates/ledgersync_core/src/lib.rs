//! # Ledgersync Core
//!
//! Local state for ledgersync.
//!
//! This crate provides:
//! - File key derivation and AES-256-GCM envelope encryption
//! - The table registry that maps remote datasets to local fields
//! - A journaled mirror store that applies change batches atomically

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
mod error;
pub mod mirror;

pub use error::{CoreError, CoreResult};
pub use mirror::{MirrorConfig, MirrorRow, MirrorStore, Table};
