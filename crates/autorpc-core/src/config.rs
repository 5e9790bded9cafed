//! Centralized configuration for autorpc.
//!
//! Transport constants, serve options, and endpoint resolution with
//! environment overrides.

use crate::{AutoRpcError, Result};
use std::fmt;

/// Transport-level configuration.
pub struct TransportConfig;

impl TransportConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_SERVER_PORT: u16 = 50052;
    pub const DEFAULT_CLIENT_PORT: u16 = 50051;

    /// Environment variable overriding the caller-supplied host.
    pub const HOST_ENV: &'static str = "AUTORPC_HOST";
    /// Environment variable overriding the caller-supplied port.
    pub const PORT_ENV: &'static str = "AUTORPC_PORT";

    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024; // 1GiB

    pub const HEALTH_PATH: &'static str = "/health";

    /// Content type of encoded procedure messages.
    pub const MESSAGE_CONTENT_TYPE: &'static str = "application/x-protobuf";
}

/// Host and port of a server, after environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve an endpoint from caller defaults and the process environment.
    ///
    /// `AUTORPC_HOST` and `AUTORPC_PORT` take precedence over `host` and `port`.
    pub fn resolve(host: &str, port: u16) -> Result<Self> {
        Self::resolve_with(host, port, |key| std::env::var(key).ok())
    }

    /// Resolve an endpoint using `lookup` in place of the process environment.
    pub fn resolve_with<F>(host: &str, port: u16, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(TransportConfig::HOST_ENV)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| host.to_string());

        let port = match lookup(TransportConfig::PORT_ENV) {
            Some(raw) if !raw.trim().is_empty() => {
                raw.trim().parse::<u16>().map_err(|e| AutoRpcError::Config {
                    message: format!(
                        "Invalid {} value '{}': {}",
                        TransportConfig::PORT_ENV,
                        raw,
                        e
                    ),
                })?
            }
            _ => port,
        };

        Ok(Self { host, port })
    }

    /// `host:port` form used for binding and URLs.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options for a served handler set.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Maximum number of calls executing at once.
    pub worker_pool_size: usize,
    /// Largest accepted request body, in bytes.
    pub max_message_size: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            // Same sizing rule as a default thread pool executor.
            worker_pool_size: (workers + 4).min(32),
            max_message_size: TransportConfig::MAX_MESSAGE_SIZE,
        }
    }
}
