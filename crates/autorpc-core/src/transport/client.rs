//! Client side of the transport.
//!
//! A [`ConnectionHandle`] pairs the contract synthesized on the client with a
//! [`Channel`] able to reach the server. The default [`HttpChannel`] opens no
//! socket until the first call.

use super::protocol::{Request, Response, TransportError};
use crate::capability::CapabilitySet;
use crate::config::{Endpoint, TransportConfig};
use crate::contract::GeneratedContract;
use crate::{AutoRpcError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that can carry one encoded request to a procedure path and
/// return the encoded response.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    async fn invoke(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>>;

    /// Human-readable target, for logs and errors.
    fn target(&self) -> String;
}

/// Channel over HTTP/1.1 using a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpChannel {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AutoRpcError::connection(endpoint.to_string(), e))?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait::async_trait]
impl Channel for HttpChannel {
    async fn invoke(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.endpoint.base_url(), path);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, TransportConfig::MESSAGE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| AutoRpcError::connection(self.endpoint.to_string(), e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| AutoRpcError::connection(self.endpoint.to_string(), e));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AutoRpcError::connection(self.endpoint.to_string(), e))?;
        let (kind, message) = match serde_json::from_str::<TransportError>(&body) {
            Ok(err) => (err.kind, err.message),
            Err(_) => ("transport".to_string(), body),
        };

        Err(AutoRpcError::RemoteInvocation {
            procedure: path.rsplit('/').next().unwrap_or(path).to_string(),
            status: status.as_u16(),
            kind,
            message,
        })
    }

    fn target(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Connection owned by one proxied object.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub endpoint: Endpoint,
    contract: Arc<GeneratedContract>,
    channel: Arc<dyn Channel>,
}

impl ConnectionHandle {
    /// Synthesize the contract for `capabilities` and prepare an HTTP channel.
    ///
    /// `AUTORPC_HOST` / `AUTORPC_PORT` override `host` / `port`. No connection
    /// is opened here.
    pub fn connect(
        service_name: &str,
        capabilities: &CapabilitySet,
        host: &str,
        port: u16,
    ) -> Result<Self> {
        let contract = GeneratedContract::build(service_name, capabilities)?;
        let endpoint = Endpoint::resolve(host, port)?;

        info!("{}: preparing connection to {}...", contract.service, endpoint);
        let channel = HttpChannel::new(endpoint.clone())?;
        info!(
            "{}: connection to {} prepared (not opened until first call)",
            contract.service, endpoint
        );

        Ok(Self::with_channel(endpoint, contract, Arc::new(channel)))
    }

    /// Use a caller-supplied channel.
    pub fn with_channel(
        endpoint: Endpoint,
        contract: GeneratedContract,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            endpoint,
            contract: Arc::new(contract),
            channel,
        }
    }

    pub fn contract(&self) -> &GeneratedContract {
        &self.contract
    }

    /// Invoke the remote procedure named `procedure`.
    ///
    /// The request and response travel as the procedure's compiled messages.
    pub async fn invoke(&self, procedure: &str, request: Request) -> Result<Response> {
        let path = self
            .contract
            .procedure_path(procedure)
            .ok_or_else(|| AutoRpcError::UnknownCapability(procedure.to_string()))?;
        let body = self.contract.encode_request(procedure, &request)?;

        debug!("Invoking {} on {} ({} bytes)", path, self.channel.target(), body.len());
        let output = self.channel.invoke(&path, body).await?;
        self.contract.decode_response(procedure, &output)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .field("service", &self.contract.service)
            .finish_non_exhaustive()
    }
}
