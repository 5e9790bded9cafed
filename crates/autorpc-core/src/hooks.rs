//! Pluggable value encoders and response decoder hooks.
//!
//! Payloads cross the wire as text. A [`ValueEncoder`] turns values into that
//! text and back; a [`ResponseDecoder`] post-processes a decoded response on
//! the client before it reaches the caller.
//!
//! # Float policy
//!
//! [`NumericEncoder`], the default response encoder, writes every
//! non-integral number as its textual form: a handler returning `2.75`
//! reaches the caller as the string `"2.75"`. Integers are untouched.

use crate::error::HandlerError;
use crate::{AutoRpcError, Result};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Encode values to payload text and decode them back.
pub trait ValueEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String>;

    fn decode(&self, payload: &str) -> Result<Value> {
        serde_json::from_str(payload).map_err(|e| AutoRpcError::Encoding {
            message: format!("Failed to decode payload: {}", e),
        })
    }
}

/// Plain JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl ValueEncoder for JsonEncoder {
    fn encode(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| AutoRpcError::Encoding {
            message: e.to_string(),
        })
    }
}

/// JSON encoding with floats rendered as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericEncoder;

impl NumericEncoder {
    fn stringify_floats(value: &Value) -> Value {
        match value {
            Value::Number(n) if n.is_f64() => Value::String(n.to_string()),
            Value::Array(items) => Value::Array(items.iter().map(Self::stringify_floats).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::stringify_floats(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl ValueEncoder for NumericEncoder {
    fn encode(&self, value: &Value) -> Result<String> {
        JsonEncoder.encode(&Self::stringify_floats(value))
    }
}

/// Raw bytes carried as standard base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wrap bytes as an envelope-ready value.
    pub fn to_value(bytes: &[u8]) -> Value {
        Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map(Base64Bytes)
            .map_err(serde::de::Error::custom)
    }
}

/// Post-decode hook applied once to a whole response value.
pub trait ResponseDecoder: Send + Sync {
    fn decode(&self, value: Value) -> std::result::Result<Value, HandlerError>;
}

impl<F> ResponseDecoder for F
where
    F: Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync,
{
    fn decode(&self, value: Value) -> std::result::Result<Value, HandlerError> {
        self(value)
    }
}

/// Turns a string response into its UTF-8 byte sequence.
///
/// The result deserializes directly as `Vec<u8>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8BytesDecoder;

impl ResponseDecoder for Utf8BytesDecoder {
    fn decode(&self, value: Value) -> std::result::Result<Value, HandlerError> {
        match value {
            Value::String(text) => Ok(Value::Array(
                text.into_bytes().into_iter().map(Value::from).collect(),
            )),
            other => Err(HandlerError::new(
                "decoder",
                format!("expected a string response, got {}", other),
            )),
        }
    }
}

/// Encoders and decoder hook in effect for one capability.
#[derive(Clone)]
pub struct SerializationHooks {
    /// Encodes call envelopes on the client.
    pub request_encoder: Arc<dyn ValueEncoder>,
    /// Encodes return values on the server.
    pub response_encoder: Arc<dyn ValueEncoder>,
    pub decoder: Option<Arc<dyn ResponseDecoder>>,
}

impl Default for SerializationHooks {
    fn default() -> Self {
        Self {
            request_encoder: Arc::new(JsonEncoder),
            response_encoder: Arc::new(NumericEncoder),
            decoder: None,
        }
    }
}

impl fmt::Debug for SerializationHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationHooks")
            .field("decoder", &self.decoder.is_some())
            .finish_non_exhaustive()
    }
}

impl SerializationHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_encoder(mut self, encoder: impl ValueEncoder + 'static) -> Self {
        self.request_encoder = Arc::new(encoder);
        self
    }

    pub fn with_response_encoder(mut self, encoder: impl ValueEncoder + 'static) -> Self {
        self.response_encoder = Arc::new(encoder);
        self
    }

    pub fn with_decoder(mut self, decoder: impl ResponseDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Run the decoder hook, if any, on a fully decoded response.
    pub fn apply_decoder(&self, value: Value) -> std::result::Result<Value, HandlerError> {
        match &self.decoder {
            Some(decoder) => decoder.decode(value),
            None => Ok(value),
        }
    }
}
