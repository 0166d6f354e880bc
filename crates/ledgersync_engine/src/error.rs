//! Error types for the sync engine.

use ledgersync_core::CoreError;
use ledgersync_protocol::{CodecError, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can end a sync call.
///
/// None of these are retried by the engine. The caller decides whether to
/// retry, re-key, or re-download.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Bad credentials or expired token.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Server reason.
        message: String,
    },

    /// The server does not know the file.
    #[error("unknown file id: {file_id}")]
    UnknownFileId {
        /// File id sent in the request.
        file_id: String,
    },

    /// The remote file was reset or uses an old format; re-download it.
    #[error("invalid file: {reason}")]
    InvalidFile {
        /// Server reason.
        reason: String,
    },

    /// A payload did not authenticate under the active key.
    #[error("decryption failed: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },

    /// The file is now encrypted with another key.
    #[error("key mismatch: expected {expected}, found {found}")]
    KeyMismatch {
        /// Key id the session expected.
        expected: String,
        /// Key id actually in use.
        found: String,
    },

    /// An encrypted payload arrived and no key is loaded.
    #[error("encrypted payload received but no key is loaded")]
    MissingKey,

    /// A change addressed a table or column the mirror does not know.
    #[error("mirror schema error: {message}")]
    MirrorSchema {
        /// Description of the failure.
        message: String,
    },

    /// Malformed wire bytes or metadata.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the failure.
        message: String,
    },

    /// The local clock cannot issue another timestamp in this millisecond.
    #[error("clock counter overflow at {millis}ms")]
    ClockOverflow {
        /// Millisecond whose counter is exhausted.
        millis: i64,
    },

    /// Network failure or unexpected HTTP status.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, if a response arrived.
        status: Option<u16>,
    },

    /// The session cannot move to the requested state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Local mirror storage failed.
    #[error("storage error: {0}")]
    Storage(#[source] CoreError),
}

impl SyncError {
    /// Creates a transport error without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns true if a `sync` call that hits this error moves the session
    /// to `Failed`.
    ///
    /// `queue_changes` and `unlock` never change the session state, whatever
    /// they return.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InvalidStateTransition { .. })
    }

    /// Returns true if the caller must load a different key before retrying.
    pub fn requires_rekey(&self) -> bool {
        matches!(
            self,
            Self::KeyMismatch { .. } | Self::MissingKey | Self::Decryption { .. }
        )
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TableNotFound { .. }
            | CoreError::ColumnNotFound { .. }
            | CoreError::InvalidSchema { .. } => Self::MirrorSchema {
                message: err.to_string(),
            },
            CoreError::DecryptionFailed { message } => Self::Decryption { message },
            CoreError::KeyMismatch { expected, found } => Self::KeyMismatch { expected, found },
            CoreError::Codec(e) => e.into(),
            CoreError::Protocol(e) => e.into(),
            other => Self::Storage(other),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ClockOverflow { millis } => Self::ClockOverflow { millis },
            other => Self::protocol(other.to_string()),
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        Self::protocol(err.to_string())
    }
}
