//! Wire types shared by the encoder and decoder.

use crate::error::{CodecError, CodecResult};

/// Longest valid varint, in bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// The subset of protobuf wire types used by the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Base-128 varint.
    Varint = 0,
    /// Length-prefixed bytes, strings and embedded messages.
    LengthDelimited = 2,
}

impl WireType {
    /// Map a raw wire type to a supported variant.
    pub fn from_raw(raw: u8) -> CodecResult<Self> {
        match raw {
            0 => Ok(Self::Varint),
            2 => Ok(Self::LengthDelimited),
            other => Err(CodecError::UnsupportedWireType { wire_type: other }),
        }
    }
}

/// A decoded field payload, borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    /// A varint payload.
    Varint(u64),
    /// A length-delimited payload.
    LengthDelimited(&'a [u8]),
}

impl<'a> WireValue<'a> {
    /// The wire type this value was read with.
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::LengthDelimited(_) => WireType::LengthDelimited,
        }
    }

    fn mismatch(&self, message: &str, field: u32, expected: WireType) -> CodecError {
        CodecError::WrongWireType {
            message: message.to_string(),
            field,
            expected: expected as u8,
            actual: self.wire_type() as u8,
        }
    }

    /// Interpret as a boolean.
    pub fn as_bool(&self, message: &str, field: u32) -> CodecResult<bool> {
        match self {
            Self::Varint(v) => Ok(*v != 0),
            Self::LengthDelimited(_) => Err(self.mismatch(message, field, WireType::Varint)),
        }
    }

    /// Interpret as raw bytes.
    pub fn as_bytes(&self, message: &str, field: u32) -> CodecResult<&'a [u8]> {
        match self {
            Self::LengthDelimited(b) => Ok(b),
            Self::Varint(_) => Err(self.mismatch(message, field, WireType::LengthDelimited)),
        }
    }

    /// Interpret as a UTF-8 string.
    pub fn as_str(&self, message: &str, field: u32) -> CodecResult<&'a str> {
        let bytes = self.as_bytes(message, field)?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}
