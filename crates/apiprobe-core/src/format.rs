//! Payload message formats for byte-oriented transports.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{BodyParseError, ClientError, ErrorKind};
use crate::message::Payload;

/// Payload encoding error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("codec error ({format}): {message}")]
pub struct CodecError {
    /// Format that rejected the payload.
    pub format: MessageFormat,
    /// Error message.
    pub message: String,
}

impl CodecError {
    fn new(format: MessageFormat, message: impl Into<String>) -> Self {
        Self {
            format,
            message: message.into(),
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        ClientError::new(ErrorKind::Config, err.to_string())
    }
}

/// How payloads are serialized on queue and socket transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// UTF-8 JSON documents.
    #[default]
    #[serde(alias = "JSON")]
    Json,
    /// UTF-8 text.
    #[serde(alias = "TEXT")]
    Text,
    /// Opaque bytes.
    #[serde(alias = "BINARY")]
    Binary,
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

impl MessageFormat {
    /// Serializes a payload to wire bytes.
    pub fn encode(&self, payload: &Payload) -> Result<Bytes, CodecError> {
        match (self, payload) {
            (_, Payload::Empty) => Ok(Bytes::new()),
            (Self::Json, Payload::Json(value)) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| CodecError::new(*self, e.to_string())),
            (Self::Json, Payload::Text(text)) => {
                serde_json::from_str::<Value>(text)
                    .map_err(|e| CodecError::new(*self, format!("text is not valid JSON: {e}")))?;
                Ok(Bytes::copy_from_slice(text.as_bytes()))
            }
            (Self::Json, Payload::Bytes(raw)) => {
                serde_json::from_slice::<Value>(raw)
                    .map_err(|e| CodecError::new(*self, format!("bytes are not valid JSON: {e}")))?;
                Ok(raw.clone())
            }
            (Self::Text, Payload::Text(text)) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            (Self::Text, Payload::Json(Value::String(text))) => {
                Ok(Bytes::copy_from_slice(text.as_bytes()))
            }
            (Self::Text, Payload::Json(value)) => Ok(Bytes::from(value.to_string())),
            (Self::Text, Payload::Bytes(raw)) => {
                std::str::from_utf8(raw)
                    .map_err(|e| CodecError::new(*self, format!("bytes are not UTF-8: {e}")))?;
                Ok(raw.clone())
            }
            (Self::Binary, Payload::Bytes(raw)) => Ok(raw.clone()),
            (Self::Binary, Payload::Text(text)) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            (Self::Binary, Payload::Json(_)) => Err(CodecError::new(
                *self,
                "structured payloads need the json or text format",
            )),
        }
    }

    /// Decodes wire bytes into a structured body.
    ///
    /// Binary messages have no structured form and yield `Ok(None)`, as does
    /// an empty JSON message.
    pub fn decode(&self, raw: &[u8]) -> Result<Option<Value>, BodyParseError> {
        match self {
            Self::Json if raw.is_empty() => Ok(None),
            Self::Json => Ok(Some(serde_json::from_slice(raw)?)),
            Self::Text => std::str::from_utf8(raw)
                .map(|s| Some(Value::String(s.to_owned())))
                .map_err(|e| BodyParseError::new(format!("invalid UTF-8: {e}"))),
            Self::Binary => Ok(None),
        }
    }
}
