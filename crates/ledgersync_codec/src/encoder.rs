//! Numbered-field wire encoder.

use crate::wire::{WireType, MAX_VARINT_LEN};

/// Append `value` as a base-128 varint.
#[allow(clippy::cast_possible_truncation)]
pub fn write_varint(buffer: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buffer.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).clamp(1, MAX_VARINT_LEN)
}

/// An encoder producing protobuf-compatible field streams.
///
/// Scalars holding their default value (empty string, empty bytes, `false`)
/// are omitted, matching proto3 presence rules. Embedded messages are always
/// written so repeated fields keep their length and order. Fields are emitted
/// in call order, which makes the output deterministic for a given input.
#[derive(Debug, Default)]
pub struct WireEncoder {
    buffer: Vec<u8>,
}

impl WireEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Write a boolean field. `false` is omitted.
    pub fn bool(&mut self, field: u32, value: bool) -> &mut Self {
        if value {
            self.key(field, WireType::Varint);
            self.buffer.push(1);
        }
        self
    }

    /// Write an unsigned varint field. Zero is omitted.
    pub fn uint64(&mut self, field: u32, value: u64) -> &mut Self {
        if value != 0 {
            self.key(field, WireType::Varint);
            write_varint(&mut self.buffer, value);
        }
        self
    }

    /// Write a string field. The empty string is omitted.
    pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.length_delimited(field, value.as_bytes());
        }
        self
    }

    /// Write an optional string field. `None` is omitted, `Some("")` is written.
    pub fn optional_string(&mut self, field: u32, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.length_delimited(field, value.as_bytes());
        }
        self
    }

    /// Write a bytes field. Empty bytes are omitted.
    pub fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        if !value.is_empty() {
            self.length_delimited(field, value);
        }
        self
    }

    /// Write an embedded message, even when it encodes to zero bytes.
    pub fn message(&mut self, field: u32, encoded: &[u8]) -> &mut Self {
        self.length_delimited(field, encoded);
        self
    }

    fn length_delimited(&mut self, field: u32, payload: &[u8]) {
        self.key(field, WireType::LengthDelimited);
        write_varint(&mut self.buffer, payload.len() as u64);
        self.buffer.extend_from_slice(payload);
    }

    fn key(&mut self, field: u32, wire_type: WireType) {
        let key = (u64::from(field) << 3) | u64::from(wire_type as u8);
        write_varint(&mut self.buffer, key);
    }
}
