//! JSON shapes for encryption metadata and key info.
//!
//! Binary fields travel as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// The only supported cipher.
pub const ALGORITHM: &str = "aes-256-gcm";

mod base64_bytes {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Parameters needed to decrypt one ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMeta {
    /// Id of the key that produced the ciphertext.
    pub key_id: String,
    /// Cipher name, always [`ALGORITHM`].
    pub algorithm: String,
    /// Nonce.
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    /// GCM authentication tag.
    #[serde(with = "base64_bytes")]
    pub auth_tag: Vec<u8>,
}

impl EncryptionMeta {
    /// Creates metadata for [`ALGORITHM`].
    pub fn new(key_id: impl Into<String>, iv: Vec<u8>, auth_tag: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: ALGORITHM.to_string(),
            iv,
            auth_tag,
        }
    }

    /// Serializes to JSON.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::invalid_meta(e.to_string()))
    }

    /// Parses from JSON.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or base64.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::invalid_meta(e.to_string()))
    }
}

/// A known-plaintext blob encrypted with a file key, used to check that a
/// locally derived key is correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTest {
    /// Ciphertext.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    /// How `value` was encrypted.
    pub meta: EncryptionMeta,
}

/// Key information served by the key-fetch endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Key id.
    pub key_id: String,
    /// KDF salt, base64 text.
    pub salt: String,
    /// Test blob for validating a derived key.
    pub test: KeyTest,
}

/// Wire form of [`KeyInfo`]: `test` is JSON nested inside a string.
#[derive(Serialize, Deserialize)]
struct KeyInfoWire {
    id: Option<String>,
    salt: Option<String>,
    test: Option<String>,
}

impl KeyInfo {
    /// Parses the `data` object of a key-fetch response.
    ///
    /// # Errors
    ///
    /// Fails if any field is missing or the nested test blob is malformed.
    pub fn from_value(value: serde_json::Value) -> ProtocolResult<Self> {
        let wire: KeyInfoWire =
            serde_json::from_value(value).map_err(|e| ProtocolError::invalid_meta(e.to_string()))?;
        let key_id = wire
            .id
            .ok_or_else(|| ProtocolError::invalid_meta("key info has no id"))?;
        let salt = wire
            .salt
            .ok_or_else(|| ProtocolError::invalid_meta("key info has no salt"))?;
        let test = wire
            .test
            .ok_or_else(|| ProtocolError::invalid_meta("key info has no test"))?;
        let test: KeyTest =
            serde_json::from_str(&test).map_err(|e| ProtocolError::invalid_meta(e.to_string()))?;
        Ok(Self { key_id, salt, test })
    }

    /// Serializes to the key-fetch `data` object.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_value(&self) -> ProtocolResult<serde_json::Value> {
        let test =
            serde_json::to_string(&self.test).map_err(|e| ProtocolError::invalid_meta(e.to_string()))?;
        let wire = KeyInfoWire {
            id: Some(self.key_id.clone()),
            salt: Some(self.salt.clone()),
            test: Some(test),
        };
        serde_json::to_value(wire).map_err(|e| ProtocolError::invalid_meta(e.to_string()))
    }
}

/// Encodes bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_json_field_names() {
        let meta = EncryptionMeta::new("key-1", vec![0; 12], vec![255; 16]);
        let json: serde_json::Value = serde_json::from_str(&meta.to_json().unwrap()).unwrap();
        assert_eq!(json["keyId"], "key-1");
        assert_eq!(json["algorithm"], "aes-256-gcm");
        assert_eq!(json["iv"], "AAAAAAAAAAAAAAAA");
        assert_eq!(json["authTag"], "/////////////////////w==");
    }

    #[test]
    fn meta_rejects_bad_base64() {
        let json = r#"{"keyId":"k","algorithm":"aes-256-gcm","iv":"***","authTag":""}"#;
        assert!(matches!(
            EncryptionMeta::from_json(json),
            Err(ProtocolError::InvalidMeta { .. })
        ));
    }

    #[test]
    fn key_info_nested_test_string() {
        let data = serde_json::json!({
            "id": "key-1",
            "salt": "YmFy",
            "test": r#"{"value":"AQID","meta":{"keyId":"key-1","algorithm":"aes-256-gcm","iv":"AAAA","authTag":"AAAA"}}"#,
        });
        let info = KeyInfo::from_value(data).unwrap();
        assert_eq!(info.key_id, "key-1");
        assert_eq!(info.salt, "YmFy");
        assert_eq!(info.test.value, vec![1, 2, 3]);
        assert_eq!(info.test.meta.key_id, "key-1");

        let back = KeyInfo::from_value(info.to_value().unwrap()).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn key_info_missing_test_fails() {
        let data = serde_json::json!({"id": "key-1", "salt": "YmFy", "test": null});
        assert!(KeyInfo::from_value(data).is_err());
    }
}
