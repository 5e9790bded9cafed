//! Generic call envelope.
//!
//! Every remote call carries its arguments as one envelope, whatever the real
//! signature of the target method:
//!
//! ```text
//! {"args": [<positional>...], "kwargs": {"<name>": <value>, ...}}
//! ```
//!
//! The envelope is encoded into the single string field of the wire request.

use crate::error::HandlerError;
use crate::hooks::ValueEncoder;
use crate::{AutoRpcError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Append any serializable value as a positional argument.
    pub fn try_arg<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.args.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Set any serializable value as a keyword argument.
    pub fn try_kwarg<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        self.kwargs.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Look up a parameter by position, falling back to its keyword name.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    /// Extract an optional string parameter.
    pub fn get_str(&self, index: usize, name: &str) -> Option<&str> {
        self.get(index, name).and_then(|v| v.as_str())
    }

    /// Extract a required parameter or return an error.
    pub fn require<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> std::result::Result<T, HandlerError> {
        let value = self.get(index, name).ok_or_else(|| {
            HandlerError::invalid_argument(format!("Missing required parameter: {}", name))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            HandlerError::invalid_argument(format!("Invalid parameter {}: {}", name, e))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Encode into the opaque request payload.
    pub fn encode(&self, encoder: &dyn ValueEncoder) -> Result<String> {
        encoder.encode(&serde_json::to_value(self)?)
    }

    /// Decode an opaque request payload.
    pub fn decode(payload: &str, encoder: &dyn ValueEncoder) -> Result<Self> {
        let value = encoder.decode(payload)?;
        if !value.is_object() {
            return Err(AutoRpcError::InvalidEnvelope {
                message: format!("expected an object, got {}", value),
            });
        }
        serde_json::from_value(value).map_err(|e| AutoRpcError::InvalidEnvelope {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{JsonEncoder, NumericEncoder};
    use serde_json::json;

    #[test]
    fn test_encode_layout() {
        let envelope = Envelope::new().arg("Some text").kwarg("repeat", 2);
        let payload = envelope.encode(&JsonEncoder).unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, json!({"args": ["Some text"], "kwargs": {"repeat": 2}}));
    }

    #[test]
    fn test_decode_restores_envelope() {
        let envelope = Envelope::new().arg(json!([1, 2, 3])).kwarg("name", "x");
        let payload = envelope.encode(&JsonEncoder).unwrap();
        assert_eq!(Envelope::decode(&payload, &JsonEncoder).unwrap(), envelope);
    }

    #[test]
    fn test_decode_is_lossy_for_floats_under_numeric_encoder() {
        let envelope = Envelope::new().arg(2.5);
        let payload = envelope.encode(&NumericEncoder).unwrap();
        let decoded = Envelope::decode(&payload, &NumericEncoder).unwrap();
        assert_eq!(decoded.args, vec![json!("2.5")]);
    }

    #[test]
    fn test_decode_missing_sections_default_to_empty() {
        let decoded = Envelope::decode("{}", &JsonEncoder).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = Envelope::decode("[1, 2]", &JsonEncoder).unwrap_err();
        assert!(matches!(err, AutoRpcError::InvalidEnvelope { .. }));

        let err = Envelope::decode("{\"args\": 5}", &JsonEncoder).unwrap_err();
        assert!(matches!(err, AutoRpcError::InvalidEnvelope { .. }));
    }

    #[test]
    fn test_parameter_lookup_prefers_position_then_keyword() {
        let positional = Envelope::new().arg("a");
        assert_eq!(positional.get_str(0, "arg"), Some("a"));

        let keyword = Envelope::new().kwarg("arg", "b");
        assert_eq!(keyword.get_str(0, "arg"), Some("b"));

        let count: u32 = Envelope::new().kwarg("count", 3).require(1, "count").unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_require_reports_missing_and_mistyped() {
        let envelope = Envelope::new().arg("text");
        let missing = envelope.require::<String>(1, "other").unwrap_err();
        assert!(missing.message.contains("Missing required parameter: other"));

        let mistyped = envelope.require::<u32>(0, "count").unwrap_err();
        assert_eq!(mistyped.kind, "invalid_argument");
    }
}
