//! Numbered-field wire decoder.

use crate::error::{CodecError, CodecResult};
use crate::wire::{WireType, WireValue, MAX_VARINT_LEN};

/// Maximum allowed length of a single length-delimited field.
/// This prevents allocation-based DoS from untrusted input.
const MAX_FIELD_LENGTH: u64 = 256 * 1024 * 1024;

/// Largest field number protobuf permits.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

/// A streaming decoder over a protobuf-compatible field stream.
///
/// The decoder yields `(field number, value)` pairs and leaves schema
/// checks (unknown fields, wire type expectations) to the caller.
pub struct WireDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read the next field, or `None` at a clean end of input.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] when the input stops inside a
    /// field, and a structural error for malformed keys or varints.
    pub fn next_field(&mut self) -> CodecResult<Option<(u32, WireValue<'a>)>> {
        if self.is_empty() {
            return Ok(None);
        }

        let key = self.read_varint()?;
        let field = key >> 3;
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(CodecError::invalid_structure(format!(
                "invalid field number {field}"
            )));
        }
        #[allow(clippy::cast_possible_truncation)]
        let field = field as u32;

        #[allow(clippy::cast_possible_truncation)]
        let wire_type = WireType::from_raw((key & 0x07) as u8)?;
        let value = match wire_type {
            WireType::Varint => WireValue::Varint(self.read_varint()?),
            WireType::LengthDelimited => {
                let len = self.read_varint()?;
                if len > MAX_FIELD_LENGTH {
                    return Err(CodecError::invalid_structure(format!(
                        "field length {len} exceeds maximum {MAX_FIELD_LENGTH}"
                    )));
                }
                let len = usize::try_from(len)
                    .map_err(|_| CodecError::invalid_structure("field length overflow"))?;
                WireValue::LengthDelimited(self.read_bytes(len)?)
            }
        };

        Ok(Some((field, value)))
    }

    fn read_varint(&mut self) -> CodecResult<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_byte()?;
            // The tenth byte may only contribute the top bit.
            if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                return Err(CodecError::invalid_structure("varint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::invalid_structure("varint longer than 10 bytes"))
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.data.len() - self.pos {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}
