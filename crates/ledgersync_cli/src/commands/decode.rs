//! Decode command implementation.

use crate::{BodyKind, Format};
use ledgersync_core::crypto::{EncryptionKey, SessionKey};
use ledgersync_protocol::{MessageEnvelope, SyncRequest, SyncResponse};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Key material for decrypting envelopes.
#[derive(Debug)]
pub struct KeyArgs {
    /// File password.
    pub password: String,
    /// Key salt.
    pub salt: String,
    /// Key id.
    pub key_id: String,
}

/// One decoded envelope.
#[derive(Debug, Serialize)]
pub struct EnvelopeInfo {
    /// Envelope timestamp.
    pub timestamp: String,
    /// Whether the content was encrypted.
    pub encrypted: bool,
    /// Decoded change, if readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeInfo>,
    /// Why the change could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A decoded change.
#[derive(Debug, Serialize)]
pub struct ChangeInfo {
    /// Dataset.
    pub dataset: String,
    /// Row id.
    pub row: String,
    /// Column.
    pub column: String,
    /// Value as JSON.
    pub value: serde_json::Value,
}

/// A decoded body.
#[derive(Debug, Serialize)]
pub struct DecodeResult {
    /// `request` or `response`.
    pub kind: &'static str,
    /// Request file id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Request group id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Request key id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Request cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Response checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle: Option<String>,
    /// Envelopes in body order.
    pub messages: Vec<EnvelopeInfo>,
}

/// Runs the decode command.
pub fn run(
    input: &Path,
    kind: BodyKind,
    key: Option<&KeyArgs>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_input(input)?;
    debug!(bytes = bytes.len(), ?kind, "decoding body");

    let session = key.map(|k| {
        SessionKey::new(
            k.key_id.clone(),
            &EncryptionKey::derive(&k.password, &k.salt),
        )
    });
    let result = decode_body(&bytes, kind, session.as_ref())?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if input.as_os_str() == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(std::fs::read(input)?)
    }
}

/// Decodes a raw body into its printable form.
///
/// Envelopes that cannot be opened are reported individually; only a body
/// that does not parse is an error.
pub fn decode_body(
    bytes: &[u8],
    kind: BodyKind,
    key: Option<&SessionKey>,
) -> Result<DecodeResult, Box<dyn std::error::Error>> {
    let result = match kind {
        BodyKind::Request => {
            let request = SyncRequest::decode(bytes)?;
            DecodeResult {
                kind: "request",
                file_id: Some(request.file_id),
                group_id: Some(request.group_id),
                key_id: request.key_id,
                since: Some(request.since.to_string()),
                merkle: None,
                messages: request.messages.iter().map(|e| describe(e, key)).collect(),
            }
        }
        BodyKind::Response => {
            let response = SyncResponse::decode(bytes)?;
            DecodeResult {
                kind: "response",
                file_id: None,
                group_id: None,
                key_id: None,
                since: None,
                merkle: Some(response.merkle),
                messages: response.messages.iter().map(|e| describe(e, key)).collect(),
            }
        }
    };
    Ok(result)
}

fn describe(envelope: &MessageEnvelope, key: Option<&SessionKey>) -> EnvelopeInfo {
    let opened = if envelope.is_encrypted {
        match key {
            Some(key) => key.open(envelope).map_err(|e| e.to_string()),
            None => Err("encrypted; pass --password, --salt and --key-id".to_string()),
        }
    } else {
        envelope.change().map_err(|e| e.to_string())
    };

    let (change, error) = match opened {
        Ok(change) => (
            Some(ChangeInfo {
                value: serde_json::Value::from(&change.value),
                dataset: change.dataset,
                row: change.row,
                column: change.column,
            }),
            None,
        ),
        Err(e) => (None, Some(e)),
    };
    EnvelopeInfo {
        timestamp: envelope.timestamp.to_string(),
        encrypted: envelope.is_encrypted,
        change,
        error,
    }
}

fn print_text_output(result: &DecodeResult) {
    println!("Sync {}", result.kind);
    println!("===========");
    if let Some(file_id) = &result.file_id {
        println!("File:      {file_id}");
    }
    if let Some(group_id) = &result.group_id {
        println!("Group:     {group_id}");
    }
    if let Some(key_id) = &result.key_id {
        println!("Key:       {key_id}");
    }
    if let Some(since) = &result.since {
        println!("Since:     {since}");
    }
    if let Some(merkle) = &result.merkle {
        println!("Merkle:    {merkle}");
    }
    println!("Messages:  {}", result.messages.len());
    println!();

    for info in &result.messages {
        let lock = if info.encrypted { "enc" } else { "   " };
        match (&info.change, &info.error) {
            (Some(c), _) => println!(
                "{} {} {}.{}[{}] = {}",
                info.timestamp, lock, c.dataset, c.column, c.row, c.value
            ),
            (None, Some(e)) => println!("{} {} <{}>", info.timestamp, lock, e),
            (None, None) => println!("{} {}", info.timestamp, lock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::{ChangeMessage, LogicalTimestamp};

    fn ts() -> LogicalTimestamp {
        "2020-10-11T12:13:14.015Z-0000-0123456789abcdef".parse().unwrap()
    }

    #[test]
    fn decodes_plain_response() {
        let change = ChangeMessage::new("accounts", "r1", "name", "Checking");
        let body = SyncResponse::new(vec![MessageEnvelope::plain(ts(), &change).unwrap()], "m")
            .encode();

        let result = decode_body(&body, BodyKind::Response, None).unwrap();
        assert_eq!(result.merkle.as_deref(), Some("m"));
        let c = result.messages[0].change.as_ref().unwrap();
        assert_eq!(c.dataset, "accounts");
        assert_eq!(c.value, serde_json::json!("Checking"));
    }

    #[test]
    fn encrypted_envelope_needs_key() {
        let key = SessionKey::new("key-1", &EncryptionKey::derive("pw", "c2FsdA=="));
        let change = ChangeMessage::new("notes", "n1", "note", 3i64);
        let request = SyncRequest::new("file-1", "group-1", ts())
            .with_messages(vec![key.seal(ts(), &change).unwrap()]);
        let body = request.encode();

        let locked = decode_body(&body, BodyKind::Request, None).unwrap();
        assert!(locked.messages[0].change.is_none());
        assert!(locked.messages[0].error.is_some());

        let opened = decode_body(&body, BodyKind::Request, Some(&key)).unwrap();
        assert_eq!(opened.file_id.as_deref(), Some("file-1"));
        assert_eq!(
            opened.messages[0].change.as_ref().unwrap().value,
            serde_json::json!(3)
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_body(&[0x0A, 0x05, 0x01], BodyKind::Response, None).is_err());
    }
}
