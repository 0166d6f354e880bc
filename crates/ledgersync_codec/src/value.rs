//! Tagged scalar values carried in a change's value field.
//!
//! Every value travels as `<tag>:<literal>`:
//!
//! | Tag | Meaning | Literal |
//! |-----|---------|---------|
//! | `0` | absent  | empty |
//! | `B` | boolean | `0` or `1` |
//! | `N` | number  | integer or float |
//! | `S` | string  | any text, may contain `:` |

use std::fmt;

use crate::error::{CodecError, CodecResult};

const SEPARATOR: char = ':';

/// A scalar value in its decoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number.
    Integer(i64),
    /// Floating-point number. Never NaN or infinite.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl TaggedValue {
    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Returns the text if this is a `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode to the tagged wire string.
    ///
    /// # Errors
    ///
    /// Fails for NaN and infinite floats, which have no literal form.
    pub fn encode(&self) -> CodecResult<String> {
        Ok(match self {
            Self::Null => "0:".to_string(),
            Self::Bool(b) => format!("B:{}", u8::from(*b)),
            Self::Integer(n) => format!("N:{n}"),
            Self::Float(f) => {
                if !f.is_finite() {
                    return Err(CodecError::encoding_failed(format!(
                        "non-finite float {f} has no tagged form"
                    )));
                }
                // Debug keeps a fractional part so the literal re-parses as a float.
                format!("N:{f:?}")
            }
            Self::Text(s) => format!("S:{s}"),
        })
    }

    /// Decode a tagged wire string.
    ///
    /// # Errors
    ///
    /// Fails on a missing separator, an unknown tag, or a literal that does
    /// not parse for its tag.
    pub fn decode(raw: &str) -> CodecResult<Self> {
        let (tag, literal) = raw.split_once(SEPARATOR).ok_or_else(|| {
            CodecError::decoding_failed(format!("tagged value {raw:?} has no separator"))
        })?;

        match tag {
            "0" => {
                if literal.is_empty() {
                    Ok(Self::Null)
                } else {
                    Err(CodecError::decoding_failed(format!(
                        "null value carries literal {literal:?}"
                    )))
                }
            }
            "B" => match literal {
                "0" => Ok(Self::Bool(false)),
                "1" => Ok(Self::Bool(true)),
                other => Err(CodecError::decoding_failed(format!(
                    "invalid boolean literal {other:?}"
                ))),
            },
            "N" => decode_number(literal),
            "S" => Ok(Self::Text(literal.to_string())),
            other => Err(CodecError::unknown_tag(other)),
        }
    }
}

fn decode_number(literal: &str) -> CodecResult<TaggedValue> {
    if let Ok(n) = literal.parse::<i64>() {
        return Ok(TaggedValue::Integer(n));
    }
    // Rust's float parser accepts "inf" and "NaN"; the wire format does not.
    let looks_numeric = literal
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    match literal.parse::<f64>() {
        Ok(f) if looks_numeric && f.is_finite() => Ok(TaggedValue::Float(f)),
        _ => Err(CodecError::decoding_failed(format!(
            "invalid number literal {literal:?}"
        ))),
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for TaggedValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for TaggedValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for TaggedValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for TaggedValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for TaggedValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<TaggedValue>> From<Option<T>> for TaggedValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<&serde_json::Value> for TaggedValue {
    type Error = CodecError;

    fn try_from(value: &serde_json::Value) -> CodecResult<Self> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(Self::Null),
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(CodecError::unsupported_type("number out of range"))
                }
            }
            Json::String(s) => Ok(Self::Text(s.clone())),
            Json::Array(_) => Err(CodecError::unsupported_type("array")),
            Json::Object(_) => Err(CodecError::unsupported_type("object")),
        }
    }
}

impl From<&TaggedValue> for serde_json::Value {
    fn from(value: &TaggedValue) -> Self {
        match value {
            TaggedValue::Null => Self::Null,
            TaggedValue::Bool(b) => Self::Bool(*b),
            TaggedValue::Integer(n) => Self::from(*n),
            TaggedValue::Float(f) => Self::from(*f),
            TaggedValue::Text(s) => Self::String(s.clone()),
        }
    }
}
