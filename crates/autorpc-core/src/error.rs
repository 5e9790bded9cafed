//! Error types for autorpc.
//!
//! Library operations return [`AutoRpcError`]. Handler methods return
//! [`HandlerError`], which the dispatcher propagates to the transport and the
//! local proxy path propagates to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for autorpc.
#[derive(Debug, Error)]
pub enum AutoRpcError {
    // Contract errors
    #[error("Contract compilation failed for {service}: {message}")]
    ContractCompilation { service: String, message: String },

    // Transport errors
    #[error("Connection error for {endpoint}: {message}")]
    Connection {
        endpoint: String,
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Remote invocation of {procedure} failed ({kind}): {message}")]
    RemoteInvocation {
        procedure: String,
        /// HTTP status reported by the transport
        status: u16,
        kind: String,
        message: String,
    },

    // Dispatch errors
    #[error("Local call to {capability} failed: {source}")]
    LocalDispatch {
        capability: String,
        #[source]
        source: HandlerError,
    },

    #[error("Handler for {capability} failed: {source}")]
    Handler {
        capability: String,
        #[source]
        source: HandlerError,
    },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid envelope: {message}")]
    InvalidEnvelope { message: String },

    // Serialization errors
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for autorpc operations.
pub type Result<T> = std::result::Result<T, AutoRpcError>;

impl From<std::io::Error> for AutoRpcError {
    fn from(err: std::io::Error) -> Self {
        AutoRpcError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AutoRpcError {
    fn from(err: serde_json::Error) -> Self {
        AutoRpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl AutoRpcError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        AutoRpcError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a connection error from a reqwest failure.
    pub fn connection(endpoint: impl Into<String>, err: reqwest::Error) -> Self {
        AutoRpcError::Connection {
            endpoint: endpoint.into(),
            message: err.to_string(),
            cause: std::error::Error::source(&err).map(|s| s.to_string()),
        }
    }

    /// Stable, machine-readable name of the failure class.
    ///
    /// Used as the `kind` of captured [`RemoteError`](crate::RemoteError) values
    /// and of transport error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AutoRpcError::ContractCompilation { .. } => "contract_compilation",
            AutoRpcError::Connection { .. } => "connection",
            AutoRpcError::RemoteInvocation { .. } => "remote_invocation",
            AutoRpcError::LocalDispatch { .. } => "local_dispatch",
            AutoRpcError::Handler { .. } => "handler",
            AutoRpcError::UnknownCapability(_) => "unknown_capability",
            AutoRpcError::InvalidEnvelope { .. } => "invalid_envelope",
            AutoRpcError::Encoding { .. } => "encoding",
            AutoRpcError::Json { .. } => "json",
            AutoRpcError::Io { .. } => "io",
            AutoRpcError::Config { .. } => "config",
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Handler raised
    /// - -32002: Contract compilation failed
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            AutoRpcError::Connection { .. } => -32000,

            AutoRpcError::Handler { .. }
            | AutoRpcError::LocalDispatch { .. }
            | AutoRpcError::RemoteInvocation { .. } => -32001,

            AutoRpcError::ContractCompilation { .. } => -32002,

            AutoRpcError::UnknownCapability(_) => -32601,

            AutoRpcError::InvalidEnvelope { .. } => -32602,

            AutoRpcError::Json { .. } => -32700,

            _ => -32603,
        }
    }
}

/// Failure raised by a handler method.
///
/// Serializable so it can cross the wire unchanged as the body of a transport
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    pub kind: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Missing or malformed call argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("invalid_argument", message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::invalid_argument(err.to_string())
    }
}
