//! Error types for the protocol crate.

use ledgersync_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or reading protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A timestamp string did not parse.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The offending input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The logical clock ran out of counter values within one millisecond.
    #[error("clock counter overflow at {millis}ms")]
    ClockOverflow {
        /// Wall time of the overflowing tick.
        millis: i64,
    },

    /// Encryption metadata or key info could not be read.
    #[error("invalid encryption metadata: {message}")]
    InvalidMeta {
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid timestamp error.
    pub fn invalid_timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid metadata error.
    pub fn invalid_meta(message: impl Into<String>) -> Self {
        Self::InvalidMeta {
            message: message.into(),
        }
    }
}
