//! # ledgersync codec
//!
//! Wire primitives for the ledgersync protocol.
//!
//! This crate provides:
//! - A protobuf-compatible field encoder and decoder, limited to the varint
//!   and length-delimited wire types the sync messages use
//! - [`TaggedValue`], the `<tag>:<literal>` scalar form carried in a change
//!
//! ## Usage
//!
//! ```
//! use ledgersync_codec::{TaggedValue, WireDecoder, WireEncoder, WireValue};
//!
//! let value = TaggedValue::from("Checking").encode().unwrap();
//! assert_eq!(value, "S:Checking");
//!
//! let mut enc = WireEncoder::new();
//! enc.string(4, &value);
//! let bytes = enc.into_bytes();
//!
//! let mut dec = WireDecoder::new(&bytes);
//! let (field, raw) = dec.next_field().unwrap().unwrap();
//! assert_eq!(field, 4);
//! assert_eq!(raw, WireValue::LengthDelimited(b"S:Checking"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;
mod wire;

pub use decoder::WireDecoder;
pub use encoder::{varint_len, write_varint, WireEncoder};
pub use error::{CodecError, CodecResult};
pub use value::TaggedValue;
pub use wire::{WireType, WireValue, MAX_VARINT_LEN};

/// Trait for types with a wire encoding.
pub trait Encode {
    /// Encode this value to wire bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from wire bytes.
pub trait Decode: Sized {
    /// Decode this value from wire bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}
