//! Messages shared by server and client.
//!
//! Every procedure is `POST /<package>.<Service>/<procedure>`. The body is the
//! [`Request`] encoded as the procedure's compiled input message, and a
//! successful answer is the [`Response`] encoded as its output message
//! (`application/x-protobuf`). Failures are answered with a JSON
//! [`TransportError`]:
//!
//! ```text
//! -> Request  { payload: "<encoded envelope>" }
//! <- 200 Response { payload: "<encoded value>" }
//! <- 4xx/5xx {"code": -32001, "kind": "handler", "message": "..."}
//! ```

use crate::AutoRpcError;
use serde::{Deserialize, Serialize};

/// Generic request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub payload: String,
}

/// Generic response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: String,
}

/// Body of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub code: i32,
    pub kind: String,
    pub message: String,
}

impl From<&AutoRpcError> for TransportError {
    fn from(err: &AutoRpcError) -> Self {
        Self {
            code: err.to_rpc_error_code(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;

    #[test]
    fn test_transport_error_layout() {
        let body = TransportError {
            code: -32601,
            kind: "unknown_capability".into(),
            message: "Unknown capability: missing".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], -32601);
        assert_eq!(json["kind"], "unknown_capability");
    }

    #[test]
    fn test_transport_error_from_handler_failure() {
        let err = AutoRpcError::Handler {
            capability: "process".into(),
            source: HandlerError::new("value_error", "bad input"),
        };
        let body = TransportError::from(&err);
        assert_eq!(body.code, -32001);
        assert_eq!(body.kind, "handler");
        assert!(body.message.contains("bad input"));
    }
}
