//! Conversions between JSON scalars and tagged wire values.

use ledgersync_codec::TaggedValue;

/// Encodes a JSON scalar as a tagged value string.
pub fn encode(json: &str) -> Result<String, Box<dyn std::error::Error>> {
    let parsed: serde_json::Value = serde_json::from_str(json)?;
    let value = TaggedValue::try_from(&parsed)?;
    Ok(value.encode()?)
}

/// Decodes a tagged value string to JSON text.
pub fn decode(tagged: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = TaggedValue::decode(tagged)?;
    Ok(serde_json::Value::from(&value).to_string())
}
