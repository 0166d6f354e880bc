//! Cryptographic operations for encrypted files.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption, nonce and tag kept detached
//! - Fresh random nonce per encryption
//! - File keys derived with PBKDF2-HMAC-SHA512 (10,000 rounds)
//! - Keys are zeroized on drop and never logged
//!
//! A failed tag check is the only signal of a wrong key, so it surfaces as
//! [`CoreError::DecryptionFailed`](crate::CoreError::DecryptionFailed).
//!
//! ## Usage
//!
//! ```
//! use ledgersync_core::crypto::{make_salt, EncryptionKey, SessionKey};
//! use ledgersync_protocol::{ChangeMessage, LogicalTimestamp};
//!
//! let key = EncryptionKey::derive("password", &make_salt());
//! let session = SessionKey::new("key-1", &key);
//!
//! let change = ChangeMessage::new("accounts", "r1", "name", "Checking");
//! let ts = LogicalTimestamp::zero("0123456789abcdef").unwrap();
//! let envelope = session.seal(ts, &change).unwrap();
//! assert_eq!(session.open(&envelope).unwrap(), change);
//! ```

mod cipher;
mod session;

pub use cipher::{
    make_salt, CryptoManager, EncryptionKey, Sealed, KDF_ITERATIONS, KEY_SIZE, NONCE_SIZE,
    SALT_SIZE, TAG_SIZE,
};
pub use session::{open_envelope, SessionKey};
