//! Protocol messages exchanged with the sync server.
//!
//! Field numbers are part of the wire contract:
//!
//! | Message | Fields |
//! |---------|--------|
//! | `ChangeMessage` | dataset=1, row=2, column=3, value=4 |
//! | `EncryptedData` | iv=1, authTag=2, data=3 |
//! | `MessageEnvelope` | timestamp=1, isEncrypted=2, content=3 |
//! | `SyncRequest` | messages=1, fileId=2, groupId=3, keyId=5, since=6 |
//! | `SyncResponse` | messages=1, merkle=2 |

use ledgersync_codec::{
    CodecError, CodecResult, Decode, Encode, TaggedValue, WireDecoder, WireEncoder,
};

use crate::clock::LogicalTimestamp;
use crate::error::{ProtocolError, ProtocolResult};

/// A single cell mutation: set `column` of `row` in `dataset` to `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMessage {
    /// Mirror table name.
    pub dataset: String,
    /// Row identifier.
    pub row: String,
    /// Column name as it appears on the wire.
    pub column: String,
    /// New cell value.
    pub value: TaggedValue,
}

/// Borrowed view of a change before its value is decoded.
struct RawChange<'a> {
    dataset: &'a str,
    row: &'a str,
    column: &'a str,
    value: Option<&'a str>,
}

impl<'a> RawChange<'a> {
    const NAME: &'static str = "ChangeMessage";

    fn decode(bytes: &'a [u8]) -> CodecResult<Self> {
        let mut raw = RawChange {
            dataset: "",
            row: "",
            column: "",
            value: None,
        };
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => raw.dataset = value.as_str(Self::NAME, field)?,
                2 => raw.row = value.as_str(Self::NAME, field)?,
                3 => raw.column = value.as_str(Self::NAME, field)?,
                4 => raw.value = Some(value.as_str(Self::NAME, field)?),
                other => return Err(CodecError::unknown_field(Self::NAME, other)),
            }
        }
        Ok(raw)
    }
}

impl ChangeMessage {
    /// Creates a new change.
    pub fn new(
        dataset: impl Into<String>,
        row: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<TaggedValue>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            row: row.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Checks that `bytes` has the field layout of a change message without
    /// interpreting the value string.
    ///
    /// Key test blobs carry arbitrary value strings, so this is the check
    /// used when validating a derived key.
    ///
    /// # Errors
    ///
    /// Fails on malformed or unknown fields.
    pub fn check_layout(bytes: &[u8]) -> CodecResult<()> {
        RawChange::decode(bytes).map(|_| ())
    }
}

impl Encode for ChangeMessage {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let value = self.value.encode()?;
        let mut enc = WireEncoder::new();
        enc.string(1, &self.dataset)
            .string(2, &self.row)
            .string(3, &self.column)
            .string(4, &value);
        Ok(enc.into_bytes())
    }
}

impl Decode for ChangeMessage {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let raw = RawChange::decode(bytes)?;
        let value = raw
            .value
            .ok_or_else(|| CodecError::decoding_failed("change message has no value"))?;
        Ok(Self {
            dataset: raw.dataset.to_string(),
            row: raw.row.to_string(),
            column: raw.column.to_string(),
            value: TaggedValue::decode(value)?,
        })
    }
}

/// Ciphertext of an encrypted change, with its GCM parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptedData {
    /// Nonce.
    pub iv: Vec<u8>,
    /// Authentication tag.
    pub auth_tag: Vec<u8>,
    /// Ciphertext.
    pub data: Vec<u8>,
}

impl EncryptedData {
    const NAME: &'static str = "EncryptedData";
}

impl Encode for EncryptedData {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut enc = WireEncoder::with_capacity(self.data.len() + 40);
        enc.bytes(1, &self.iv)
            .bytes(2, &self.auth_tag)
            .bytes(3, &self.data);
        Ok(enc.into_bytes())
    }
}

impl Decode for EncryptedData {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut out = Self::default();
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => out.iv = value.as_bytes(Self::NAME, field)?.to_vec(),
                2 => out.auth_tag = value.as_bytes(Self::NAME, field)?.to_vec(),
                3 => out.data = value.as_bytes(Self::NAME, field)?.to_vec(),
                other => return Err(CodecError::unknown_field(Self::NAME, other)),
            }
        }
        Ok(out)
    }
}

/// A timestamped change, possibly encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Logical timestamp of the change.
    pub timestamp: LogicalTimestamp,
    /// Whether `content` is an encoded [`EncryptedData`].
    pub is_encrypted: bool,
    /// Encoded [`ChangeMessage`] or [`EncryptedData`].
    pub content: Vec<u8>,
}

impl MessageEnvelope {
    const NAME: &'static str = "MessageEnvelope";

    /// Wraps a plaintext change.
    ///
    /// # Errors
    ///
    /// Fails if the change cannot be encoded.
    pub fn plain(timestamp: LogicalTimestamp, change: &ChangeMessage) -> CodecResult<Self> {
        Ok(Self {
            timestamp,
            is_encrypted: false,
            content: change.encode()?,
        })
    }

    /// Wraps encrypted change data.
    ///
    /// # Errors
    ///
    /// Fails if the data cannot be encoded.
    pub fn encrypted(timestamp: LogicalTimestamp, data: &EncryptedData) -> CodecResult<Self> {
        Ok(Self {
            timestamp,
            is_encrypted: true,
            content: data.encode()?,
        })
    }

    /// Decodes the content of a plaintext envelope.
    ///
    /// # Errors
    ///
    /// Fails if the envelope is encrypted or the content is malformed.
    pub fn change(&self) -> CodecResult<ChangeMessage> {
        if self.is_encrypted {
            return Err(CodecError::decoding_failed(
                "envelope is encrypted; decrypt before decoding",
            ));
        }
        ChangeMessage::decode(&self.content)
    }

    /// Decodes the content of an encrypted envelope.
    ///
    /// # Errors
    ///
    /// Fails if the envelope is not encrypted or the content is malformed.
    pub fn encrypted_data(&self) -> CodecResult<EncryptedData> {
        if !self.is_encrypted {
            return Err(CodecError::decoding_failed("envelope is not encrypted"));
        }
        EncryptedData::decode(&self.content)
    }

    /// Encodes to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = WireEncoder::with_capacity(self.content.len() + 64);
        enc.string(1, &self.timestamp.to_string())
            .bool(2, self.is_encrypted)
            .bytes(3, &self.content);
        enc.into_bytes()
    }

    /// Decodes from wire bytes.
    ///
    /// # Errors
    ///
    /// Fails on malformed input or a missing or invalid timestamp.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut timestamp = None;
        let mut is_encrypted = false;
        let mut content = Vec::new();
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => timestamp = Some(value.as_str(Self::NAME, field)?),
                2 => is_encrypted = value.as_bool(Self::NAME, field)?,
                3 => content = value.as_bytes(Self::NAME, field)?.to_vec(),
                other => return Err(CodecError::unknown_field(Self::NAME, other).into()),
            }
        }
        let timestamp = timestamp
            .ok_or_else(|| ProtocolError::invalid_timestamp("", "envelope has no timestamp"))?
            .parse::<LogicalTimestamp>()?;
        Ok(Self {
            timestamp,
            is_encrypted,
            content,
        })
    }
}

/// A sync request: local changes to upload plus the cursor to read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Outgoing envelopes in the order they were queued.
    pub messages: Vec<MessageEnvelope>,
    /// Remote file id.
    pub file_id: String,
    /// Remote group id.
    pub group_id: String,
    /// Active encryption key id, if the file is encrypted.
    pub key_id: Option<String>,
    /// Return changes newer than this timestamp.
    pub since: LogicalTimestamp,
}

impl SyncRequest {
    const NAME: &'static str = "SyncRequest";

    /// Creates a request with no outgoing messages.
    pub fn new(
        file_id: impl Into<String>,
        group_id: impl Into<String>,
        since: LogicalTimestamp,
    ) -> Self {
        Self {
            messages: Vec::new(),
            file_id: file_id.into(),
            group_id: group_id.into(),
            key_id: None,
            since,
        }
    }

    /// Sets the key id.
    pub fn with_key_id(mut self, key_id: Option<String>) -> Self {
        self.key_id = key_id;
        self
    }

    /// Sets the outgoing messages.
    pub fn with_messages(mut self, messages: Vec<MessageEnvelope>) -> Self {
        self.messages = messages;
        self
    }

    /// Encodes to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = WireEncoder::new();
        for envelope in &self.messages {
            enc.message(1, &envelope.encode());
        }
        enc.string(2, &self.file_id)
            .string(3, &self.group_id)
            .optional_string(5, self.key_id.as_deref())
            .string(6, &self.since.to_string());
        enc.into_bytes()
    }

    /// Decodes from wire bytes.
    ///
    /// # Errors
    ///
    /// Fails on malformed input or a missing `since` timestamp.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut messages = Vec::new();
        let mut file_id = String::new();
        let mut group_id = String::new();
        let mut key_id = None;
        let mut since = None;
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => messages.push(MessageEnvelope::decode(value.as_bytes(Self::NAME, field)?)?),
                2 => file_id = value.as_str(Self::NAME, field)?.to_string(),
                3 => group_id = value.as_str(Self::NAME, field)?.to_string(),
                5 => key_id = Some(value.as_str(Self::NAME, field)?.to_string()),
                6 => since = Some(value.as_str(Self::NAME, field)?),
                other => return Err(CodecError::unknown_field(Self::NAME, other).into()),
            }
        }
        let since = since
            .ok_or_else(|| ProtocolError::invalid_timestamp("", "request has no since cursor"))?
            .parse::<LogicalTimestamp>()?;
        Ok(Self {
            messages,
            file_id,
            group_id,
            key_id,
            since,
        })
    }
}

/// A sync response: changes newer than the request cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncResponse {
    /// Envelopes in server order.
    pub messages: Vec<MessageEnvelope>,
    /// Opaque server checkpoint.
    pub merkle: String,
}

impl SyncResponse {
    const NAME: &'static str = "SyncResponse";

    /// Creates a response.
    pub fn new(messages: Vec<MessageEnvelope>, merkle: impl Into<String>) -> Self {
        Self {
            messages,
            merkle: merkle.into(),
        }
    }

    /// Returns true if the response carries no envelopes.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Encodes to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = WireEncoder::new();
        for envelope in &self.messages {
            enc.message(1, &envelope.encode());
        }
        enc.string(2, &self.merkle);
        enc.into_bytes()
    }

    /// Decodes from wire bytes. Empty input is a valid empty response.
    ///
    /// # Errors
    ///
    /// Fails on truncated input, unknown fields, or a malformed envelope.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut out = Self::default();
        let mut decoder = WireDecoder::new(bytes);
        while let Some((field, value)) = decoder.next_field()? {
            match field {
                1 => out
                    .messages
                    .push(MessageEnvelope::decode(value.as_bytes(Self::NAME, field)?)?),
                2 => out.merkle = value.as_str(Self::NAME, field)?.to_string(),
                other => return Err(CodecError::unknown_field(Self::NAME, other).into()),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64, counter: u16) -> LogicalTimestamp {
        LogicalTimestamp::new(millis, counter, "0123456789abcdef").unwrap()
    }

    fn checking() -> ChangeMessage {
        ChangeMessage::new("accounts", "r1", "name", "Checking")
    }

    #[test]
    fn change_roundtrip() {
        let change = checking();
        let bytes = change.encode().unwrap();
        assert_eq!(ChangeMessage::decode(&bytes).unwrap(), change);
    }

    #[test]
    fn change_with_unknown_tag_fails() {
        let mut enc = WireEncoder::new();
        enc.string(1, "accounts").string(2, "r1").string(3, "name").string(4, "T:foo");
        let err = ChangeMessage::decode(&enc.into_bytes()).unwrap_err();
        assert_eq!(err, CodecError::unknown_tag("T"));
    }

    #[test]
    fn change_without_value_fails() {
        let mut enc = WireEncoder::new();
        enc.string(1, "accounts");
        assert!(ChangeMessage::decode(&enc.into_bytes()).is_err());
    }

    #[test]
    fn check_layout_ignores_value_format() {
        let mut enc = WireEncoder::new();
        enc.string(1, "a").string(2, "b").string(3, "c").string(4, "not tagged");
        let bytes = enc.into_bytes();
        assert!(ChangeMessage::check_layout(&bytes).is_ok());
        assert!(ChangeMessage::decode(&bytes).is_err());
    }

    #[test]
    fn change_unknown_field_fails() {
        let mut enc = WireEncoder::new();
        enc.string(1, "accounts").string(9, "extra");
        assert_eq!(
            ChangeMessage::check_layout(&enc.into_bytes()),
            Err(CodecError::unknown_field("ChangeMessage", 9))
        );
    }

    #[test]
    fn envelope_roundtrip() {
        let env = MessageEnvelope::plain(ts(1000, 1), &checking()).unwrap();
        let decoded = MessageEnvelope::decode(&env.encode()).unwrap();
        assert_eq!(decoded, env);
        assert_eq!(decoded.change().unwrap(), checking());
    }

    #[test]
    fn encrypted_envelope_refuses_plain_decode() {
        let data = EncryptedData {
            iv: vec![1; 12],
            auth_tag: vec![2; 16],
            data: vec![3; 20],
        };
        let env = MessageEnvelope::encrypted(ts(1, 0), &data).unwrap();
        assert!(env.change().is_err());
        assert_eq!(env.encrypted_data().unwrap(), data);
    }

    #[test]
    fn envelope_without_timestamp_fails() {
        let mut enc = WireEncoder::new();
        enc.bytes(3, b"x");
        assert!(matches!(
            MessageEnvelope::decode(&enc.into_bytes()),
            Err(ProtocolError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn request_roundtrip() {
        let env = MessageEnvelope::plain(ts(1000, 0), &checking()).unwrap();
        let req = SyncRequest::new("file", "group", ts(0, 0))
            .with_key_id(Some("key-1".into()))
            .with_messages(vec![env.clone(), env]);
        let decoded = SyncRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn request_encoding_is_deterministic() {
        let env = MessageEnvelope::plain(ts(1000, 0), &checking()).unwrap();
        let req = SyncRequest::new("file", "group", ts(0, 0)).with_messages(vec![env]);
        assert_eq!(req.encode(), req.clone().encode());
    }

    #[test]
    fn empty_response_is_valid() {
        let resp = SyncResponse::decode(&[]).unwrap();
        assert!(resp.is_empty());
        assert_eq!(resp.merkle, "");
    }

    #[test]
    fn response_roundtrip_keeps_order() {
        let envs = vec![
            MessageEnvelope::plain(ts(3, 0), &checking()).unwrap(),
            MessageEnvelope::plain(ts(1, 0), &checking()).unwrap(),
        ];
        let resp = SyncResponse::new(envs, "{\"hash\":1}");
        let decoded = SyncResponse::decode(&resp.encode()).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn truncated_response_is_distinct_from_empty() {
        let env = MessageEnvelope::plain(ts(3, 0), &checking()).unwrap();
        let bytes = SyncResponse::new(vec![env], "m").encode();
        let err = SyncResponse::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err, ProtocolError::Codec(CodecError::UnexpectedEof));
    }

    #[test]
    fn response_unknown_field_fails() {
        let mut enc = WireEncoder::new();
        enc.string(3, "surprise");
        assert_eq!(
            SyncResponse::decode(&enc.into_bytes()),
            Err(ProtocolError::Codec(CodecError::unknown_field(
                "SyncResponse",
                3
            )))
        );
    }
}
