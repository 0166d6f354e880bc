//! The active file key and the envelope-level operations that use it.

use ledgersync_codec::{Decode, Encode};
use ledgersync_protocol::{
    ChangeMessage, EncryptedData, EncryptionMeta, KeyInfo, KeyTest, LogicalTimestamp,
    MessageEnvelope, ALGORITHM,
};
use rand::RngCore;
use tracing::debug;

use super::cipher::{CryptoManager, EncryptionKey};
use crate::error::{CoreError, CoreResult};

/// A file key bound to its id.
///
/// Owned by exactly one sync session.
#[derive(Debug)]
pub struct SessionKey {
    key_id: String,
    manager: CryptoManager,
}

impl SessionKey {
    /// Binds `key` to `key_id`.
    pub fn new(key_id: impl Into<String>, key: &EncryptionKey) -> Self {
        Self {
            key_id: key_id.into(),
            manager: CryptoManager::new(key),
        }
    }

    /// Derives the file key from `password` and checks it against the
    /// server's test blob.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] when the password is wrong, and
    /// [`CoreError::KeyMismatch`] when the test blob names another key.
    pub fn unlock(password: &str, info: &KeyInfo) -> CoreResult<Self> {
        let key = EncryptionKey::derive(password, &info.salt);
        let session = Self::new(info.key_id.clone(), &key);
        session.validate(&info.test)?;
        debug!(key_id = %info.key_id, "derived key validated");
        Ok(session)
    }

    /// Checks that this key decrypts `test` to a change message.
    ///
    /// # Errors
    ///
    /// See [`SessionKey::unlock`].
    pub fn validate(&self, test: &KeyTest) -> CoreResult<()> {
        let plaintext = self.decrypt_with_meta(&test.value, &test.meta)?;
        ChangeMessage::check_layout(&plaintext)
            .map_err(|e| CoreError::decryption_failed(format!("key test did not decode: {e}")))
    }

    /// Encrypts a random change to produce a test blob for this key.
    ///
    /// # Errors
    ///
    /// Fails if encryption fails.
    pub fn make_test(&self) -> CoreResult<KeyTest> {
        let random = || {
            let mut bytes = [0u8; 12];
            rand::thread_rng().fill_bytes(&mut bytes);
            ledgersync_protocol::encode_base64(&bytes)
        };
        let change = ChangeMessage::new(random(), random(), random(), random());
        let (value, meta) = self.encrypt_with_meta(&change.encode()?)?;
        Ok(KeyTest { value, meta })
    }

    /// Id of this key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypts `plaintext` and describes how in an [`EncryptionMeta`].
    ///
    /// # Errors
    ///
    /// Fails if encryption fails.
    pub fn encrypt_with_meta(&self, plaintext: &[u8]) -> CoreResult<(Vec<u8>, EncryptionMeta)> {
        let sealed = self.manager.encrypt(plaintext)?;
        let meta = EncryptionMeta::new(
            self.key_id.clone(),
            sealed.iv.to_vec(),
            sealed.auth_tag.to_vec(),
        );
        Ok((sealed.ciphertext, meta))
    }

    /// Decrypts a ciphertext described by `meta`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyMismatch`] if `meta` names a different key,
    /// and [`CoreError::DecryptionFailed`] for an unknown algorithm or a tag
    /// that does not verify.
    pub fn decrypt_with_meta(&self, ciphertext: &[u8], meta: &EncryptionMeta) -> CoreResult<Vec<u8>> {
        if meta.key_id != self.key_id {
            return Err(CoreError::key_mismatch(&self.key_id, &meta.key_id));
        }
        if meta.algorithm != ALGORITHM {
            return Err(CoreError::decryption_failed(format!(
                "unsupported algorithm {:?}",
                meta.algorithm
            )));
        }
        self.manager.decrypt(&meta.iv, ciphertext, &meta.auth_tag)
    }

    /// Encrypts a change into an envelope.
    ///
    /// # Errors
    ///
    /// Fails if encoding or encryption fails.
    pub fn seal(&self, timestamp: LogicalTimestamp, change: &ChangeMessage) -> CoreResult<MessageEnvelope> {
        let sealed = self.manager.encrypt(&change.encode()?)?;
        let data = EncryptedData {
            iv: sealed.iv.to_vec(),
            auth_tag: sealed.auth_tag.to_vec(),
            data: sealed.ciphertext,
        };
        Ok(MessageEnvelope::encrypted(timestamp, &data)?)
    }

    /// Decrypts and decodes an encrypted envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] if the tag does not verify,
    /// and a codec error for malformed content.
    pub fn open(&self, envelope: &MessageEnvelope) -> CoreResult<ChangeMessage> {
        let data = envelope.encrypted_data()?;
        let plaintext = self.manager.decrypt(&data.iv, &data.data, &data.auth_tag)?;
        Ok(ChangeMessage::decode(&plaintext)?)
    }
}

/// Decodes an envelope, decrypting with `key` when it is flagged encrypted.
///
/// # Errors
///
/// Returns [`CoreError::DecryptionFailed`] for an encrypted envelope when no
/// key is given or the key is wrong.
pub fn open_envelope(envelope: &MessageEnvelope, key: Option<&SessionKey>) -> CoreResult<ChangeMessage> {
    if !envelope.is_encrypted {
        return Ok(envelope.change()?);
    }
    match key {
        Some(key) => key.open(envelope),
        None => Err(CoreError::decryption_failed(
            "envelope is encrypted and no key is loaded",
        )),
    }
}
