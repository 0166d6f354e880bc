//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes or a tagged value string.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Input ended in the middle of a field.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid UTF-8 in a string field.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Malformed wire structure (bad key, overlong varint, ...).
    #[error("invalid wire structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A field number not present in the message schema.
    #[error("unknown field {field} in {message}")]
    UnknownField {
        /// Name of the message being decoded.
        message: String,
        /// The offending field number.
        field: u32,
    },

    /// A known field carried the wrong wire type.
    #[error("field {field} of {message} has wire type {actual}, expected {expected}")]
    WrongWireType {
        /// Name of the message being decoded.
        message: String,
        /// The field number.
        field: u32,
        /// The wire type the schema requires.
        expected: u8,
        /// The wire type found in the input.
        actual: u8,
    },

    /// Wire types other than varint and length-delimited.
    #[error("unsupported wire type {wire_type}")]
    UnsupportedWireType {
        /// The raw wire type.
        wire_type: u8,
    },

    /// Unrecognized tag in a tagged value string.
    #[error("unknown value tag: {tag:?}")]
    UnknownTag {
        /// The tag that was found.
        tag: String,
    },

    /// Value type that cannot be carried by a tagged value.
    #[error("unsupported value type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(message: impl Into<String>, field: u32) -> Self {
        Self::UnknownField {
            message: message.into(),
            field,
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create an unknown tag error.
    pub fn unknown_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTag { tag: tag.into() }
    }
}
