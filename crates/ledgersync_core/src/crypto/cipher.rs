//! AES-256-GCM with detached nonce and tag, and PBKDF2 key derivation.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of a freshly generated salt, before base64.
pub const SALT_SIZE: usize = 32;
/// PBKDF2 rounds.
pub const KDF_ITERATIONS: u32 = 10_000;

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a file key from a password with PBKDF2-HMAC-SHA512.
    ///
    /// `salt` is the base64 salt text stored with the file. Its UTF-8 bytes
    /// are the KDF salt; it is not base64-decoded first.
    #[must_use]
    pub fn derive(password: &str, salt: &str) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), KDF_ITERATIONS, &mut bytes);
        Self { bytes }
    }

    /// Base64 form of the key, for display in operator tooling.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generates a new random salt, base64 encoded.
pub fn make_salt() -> String {
    let mut bytes = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Output of [`CryptoManager::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Random nonce used for this call.
    pub iv: [u8; NONCE_SIZE],
    /// GCM authentication tag.
    pub auth_tag: [u8; TAG_SIZE],
}

/// Encrypts and decrypts with one key.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl CryptoManager {
    /// Creates a new crypto manager with the given key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EncryptionFailed`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Sealed> {
        let mut iv = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut ciphertext = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut ciphertext)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut auth_tag = [0u8; TAG_SIZE];
        auth_tag.copy_from_slice(&tag);
        Ok(Sealed {
            ciphertext,
            iv,
            auth_tag,
        })
    }

    /// Decrypts and authenticates `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] when the nonce or tag has the
    /// wrong length or the tag does not verify.
    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8], auth_tag: &[u8]) -> CoreResult<Vec<u8>> {
        if iv.len() != NONCE_SIZE {
            return Err(CoreError::decryption_failed(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        if auth_tag.len() != TAG_SIZE {
            return Err(CoreError::decryption_failed(format!(
                "auth tag must be {TAG_SIZE} bytes, got {}",
                auth_tag.len()
            )));
        }

        let mut plaintext = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(iv),
                b"",
                &mut plaintext,
                GenericArray::from_slice(auth_tag),
            )
            .map_err(|_| CoreError::decryption_failed("authentication tag mismatch"))?;
        Ok(plaintext)
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_matches_reference_vector() {
        let key = EncryptionKey::derive("foo", "YmFy");
        assert_eq!(key.to_base64(), "+Do1kTWpkRT0w4kl2suJLdbY1BLtyEpRCiImRtslNgQ=");
    }

    #[test]
    fn derive_depends_on_salt() {
        let a = EncryptionKey::derive("pw", &make_salt());
        let b = EncryptionKey::derive("pw", &make_salt());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn salt_is_base64_of_32_bytes() {
        let salt = make_salt();
        assert_eq!(STANDARD.decode(&salt).unwrap().len(), SALT_SIZE);
    }

    #[test]
    fn key_wrong_size() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
        assert!(EncryptionKey::from_bytes(&[0u8; 64]).is_err());
        assert!(EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::from_bytes(&[0x41; KEY_SIZE]).unwrap();
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("65"));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let sealed = manager.encrypt(b"Hello, ledger").unwrap();

        assert_ne!(sealed.ciphertext, b"Hello, ledger");
        let plain = manager
            .decrypt(&sealed.iv, &sealed.ciphertext, &sealed.auth_tag)
            .unwrap();
        assert_eq!(plain, b"Hello, ledger");
    }

    #[test]
    fn fresh_nonce_per_call() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let a = manager.encrypt(b"same").unwrap();
        let b = manager.encrypt(b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = CryptoManager::new(&EncryptionKey::generate())
            .encrypt(b"secret")
            .unwrap();
        let other = CryptoManager::new(&EncryptionKey::generate());
        assert!(matches!(
            other.decrypt(&sealed.iv, &sealed.ciphertext, &sealed.auth_tag),
            Err(CoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn tampered_tag_fails() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let mut sealed = manager.encrypt(b"data").unwrap();
        sealed.auth_tag[0] ^= 0xFF;
        assert!(manager
            .decrypt(&sealed.iv, &sealed.ciphertext, &sealed.auth_tag)
            .is_err());
    }

    #[test]
    fn short_tag_fails() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let sealed = manager.encrypt(b"data").unwrap();
        assert!(manager
            .decrypt(&sealed.iv, &sealed.ciphertext, &sealed.auth_tag[..12])
            .is_err());
    }

    #[test]
    fn empty_plaintext() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let sealed = manager.encrypt(b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        let plain = manager
            .decrypt(&sealed.iv, &sealed.ciphertext, &sealed.auth_tag)
            .unwrap();
        assert!(plain.is_empty());
    }
}
