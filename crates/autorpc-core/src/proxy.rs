//! Client-side proxies.
//!
//! A [`RemoteObject`] wraps a handler instance. Each exported method is
//! reachable through a [`ProxyMethod`] whose behavior depends on whether the
//! object holds a connection:
//!
//! - **Connected**: the call is encoded, sent to the same-named remote
//!   procedure, decoded, and passed through the capability's decoder hook.
//!   Any failure along the way is returned as data, `{"error": {"kind",
//!   "message"}}`, not as `Err`.
//! - **Not connected**: the handler method runs in-process and its result or
//!   failure is returned unchanged (failures as [`AutoRpcError::LocalDispatch`]).
//!
//! The two paths report handler failures differently; callers that switch
//! between local and remote mode must handle both.

use crate::capability::{describe, CapabilitySet, MethodDescriptor, RemoteHandler};
use crate::envelope::Envelope;
use crate::transport::client::ConnectionHandle;
use crate::transport::protocol::Request;
use crate::{AutoRpcError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{error, info};

/// Failure of a remote call, captured as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
    /// Failure kind reported by the server, when the server answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_kind: Option<String>,
}

impl RemoteError {
    /// `{"error": {"kind": ..., "message": ...}}`
    pub fn to_value(&self) -> Value {
        json!({ "error": self })
    }

    /// Recognize a captured failure in a call result.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        serde_json::from_value(object.get("error")?.clone()).ok()
    }
}

impl From<&AutoRpcError> for RemoteError {
    fn from(err: &AutoRpcError) -> Self {
        let remote_kind = match err {
            AutoRpcError::RemoteInvocation { kind, .. } => Some(kind.clone()),
            _ => None,
        };
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            remote_kind,
        }
    }
}

/// Client-side callable for one capability.
#[derive(Clone)]
pub struct ProxyMethod {
    descriptor: MethodDescriptor,
    connection: Option<ConnectionHandle>,
}

impl ProxyMethod {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// True if calls are forwarded to a server.
    pub fn is_remote(&self) -> bool {
        self.connection.is_some()
    }

    /// Call the capability.
    ///
    /// Remote failures come back as `Ok` holding a [`RemoteError`] value;
    /// local failures come back as `Err`.
    pub async fn call(&self, envelope: Envelope) -> Result<Value> {
        match &self.connection {
            Some(connection) => {
                info!("Run remote function {}.", self.name());
                match self.call_remote(connection, envelope).await {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        error!("Fail to compute {} remote function: {}", self.name(), e);
                        Ok(RemoteError::from(&e).to_value())
                    }
                }
            }
            None => self
                .descriptor
                .invoke(&envelope)
                .map_err(|source| AutoRpcError::LocalDispatch {
                    capability: self.descriptor.name.clone(),
                    source,
                }),
        }
    }

    async fn call_remote(&self, connection: &ConnectionHandle, envelope: Envelope) -> Result<Value> {
        let hooks = &self.descriptor.hooks;

        let payload = envelope.encode(hooks.request_encoder.as_ref())?;
        let response = connection
            .invoke(&self.descriptor.name, Request { payload })
            .await?;
        let value = hooks.response_encoder.decode(&response.payload)?;

        hooks
            .apply_decoder(value)
            .map_err(|e| AutoRpcError::Encoding {
                message: format!("decoder hook failed: {}", e),
            })
    }
}

impl std::fmt::Debug for ProxyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMethod")
            .field("name", &self.descriptor.name)
            .field("remote", &self.is_remote())
            .finish()
    }
}

/// A handler instance whose exported methods run locally or remotely.
pub struct RemoteObject<H: RemoteHandler> {
    handler: Arc<H>,
    methods: Vec<MethodDescriptor>,
    connection: Option<ConnectionHandle>,
}

impl<H: RemoteHandler> RemoteObject<H> {
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<H>) -> Self {
        let methods = describe(&handler, 0);
        Self {
            handler,
            methods,
            connection: None,
        }
    }

    /// Shared handle to the wrapped handler.
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }

    /// Build this object's contract and attach a connection to `host:port`.
    ///
    /// Replaces any existing connection. The socket opens on first call.
    pub fn connect(&mut self, service_name: &str, host: &str, port: u16) -> Result<()> {
        let connection = ConnectionHandle::connect(service_name, &self.capabilities(), host, port)?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Attach an already prepared connection.
    pub fn attach(&mut self, connection: ConnectionHandle) {
        self.connection = Some(connection);
    }

    /// Return to local mode.
    pub fn disconnect(&mut self) -> Option<ConnectionHandle> {
        self.connection.take()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Proxy for one capability.
    pub fn method(&self, name: &str) -> Result<ProxyMethod> {
        let descriptor = self
            .methods
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| AutoRpcError::UnknownCapability(name.to_string()))?;
        Ok(ProxyMethod {
            descriptor: descriptor.clone(),
            connection: self.connection.clone(),
        })
    }

    /// One proxy per capability, in export order.
    pub fn methods(&self) -> Vec<ProxyMethod> {
        self.methods
            .iter()
            .map(|descriptor| ProxyMethod {
                descriptor: descriptor.clone(),
                connection: self.connection.clone(),
            })
            .collect()
    }

    /// Call a capability by name.
    pub async fn call(&self, name: &str, envelope: Envelope) -> Result<Value> {
        self.method(name)?.call(envelope).await
    }
}

impl<H: RemoteHandler> Deref for RemoteObject<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handler
    }
}
