//! Error types for ledgersync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Wire codec error.
    #[error("codec error: {0}")]
    Codec(#[from] ledgersync_codec::CodecError),

    /// Protocol data error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ledgersync_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Authentication tag did not verify: wrong key or tampered data.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Raw key material had the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Actual size provided.
        actual: usize,
        /// Expected size.
        expected: usize,
    },

    /// Ciphertext was produced by a different key than the active one.
    #[error("key mismatch: active key {expected}, data encrypted with {found}")]
    KeyMismatch {
        /// Id of the active key.
        expected: String,
        /// Id carried by the encryption metadata.
        found: String,
    },

    /// A change addressed a table the mirror does not know.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Dataset name from the change.
        name: String,
    },

    /// A change addressed a column its table does not have.
    #[error("column not found: {table}.{column}")]
    ColumnNotFound {
        /// Table name.
        table: String,
        /// Column name from the change.
        column: String,
    },

    /// The table registry is inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// The journal is corrupted or invalid.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch in a journal record.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Another process holds the mirror journal.
    #[error("mirror locked: another process has exclusive access")]
    MirrorLocked,
}

impl CoreError {
    /// Create a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Create an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Create an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { actual, expected }
    }

    /// Create a key mismatch error.
    pub fn key_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::KeyMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Create a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Create a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Returns true for unknown table or column errors.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::TableNotFound { .. } | Self::ColumnNotFound { .. })
    }
}
