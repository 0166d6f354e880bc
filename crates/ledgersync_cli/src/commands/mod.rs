//! CLI command implementations.

pub mod decode;
pub mod derive_key;
pub mod inspect;
pub mod timestamp;
pub mod value;
