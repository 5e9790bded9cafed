//! Server-side routing from procedure names to handler methods.
//!
//! Several handler instances can be served under one contract. The
//! [`DispatchTable`] maps each capability name to exactly one bound method:
//! the first registered handler exporting a name owns it, and later handlers
//! exporting the same name are unreachable under that name.

use crate::capability::{CapabilitySet, HandlerSet, MethodDescriptor};
use crate::contract::GeneratedContract;
use crate::envelope::Envelope;
use crate::transport::protocol::{Request, Response};
use crate::{AutoRpcError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability name → bound method, first-seen-wins.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    routes: HashMap<String, MethodDescriptor>,
    capabilities: CapabilitySet,
}

impl DispatchTable {
    pub fn build(handlers: &HandlerSet) -> Self {
        let mut table = Self::default();
        for descriptor in handlers.descriptors() {
            if let Some(existing) = table.routes.get(&descriptor.name) {
                debug!(
                    "Capability {} of {} shadowed by {}",
                    descriptor.name, descriptor.owner, existing.owner
                );
                continue;
            }
            table.capabilities.insert(descriptor.name.clone());
            table
                .routes
                .insert(descriptor.name.clone(), descriptor.clone());
        }
        table
    }

    pub fn route(&self, capability: &str) -> Option<&MethodDescriptor> {
        self.routes.get(capability)
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Contract and routing table owned by one served service.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub contract: Arc<GeneratedContract>,
    pub table: Arc<DispatchTable>,
}

impl ServiceContext {
    /// Route `handlers` and compile their contract under `service_name`.
    pub fn build(service_name: &str, handlers: &HandlerSet) -> Result<Self> {
        let table = DispatchTable::build(handlers);
        let contract = GeneratedContract::build(service_name, table.capabilities())?;
        Ok(Self {
            contract: Arc::new(contract),
            table: Arc::new(table),
        })
    }
}

/// Implements every procedure of a contract against a dispatch table.
#[derive(Debug, Clone)]
pub struct AggregateServicer {
    context: ServiceContext,
}

impl AggregateServicer {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn contract(&self) -> &GeneratedContract {
        &self.context.contract
    }

    /// Decode, invoke, encode.
    ///
    /// Handler failures are returned as [`AutoRpcError::Handler`] and are
    /// left for the transport to report.
    pub fn dispatch(&self, procedure: &str, request: Request) -> Result<Response> {
        let descriptor = self
            .context
            .table
            .route(procedure)
            .ok_or_else(|| AutoRpcError::UnknownCapability(procedure.to_string()))?;

        let envelope = Envelope::decode(&request.payload, descriptor.hooks.request_encoder.as_ref())?;

        debug!(
            "Dispatching {} to {} ({} args, {} kwargs)",
            procedure,
            descriptor.owner,
            envelope.args.len(),
            envelope.kwargs.len()
        );

        let value = descriptor
            .invoke(&envelope)
            .map_err(|source| AutoRpcError::Handler {
                capability: procedure.to_string(),
                source,
            })?;

        let payload = descriptor.hooks.response_encoder.encode(&value)?;
        Ok(Response { payload })
    }

    /// Serve one call from its wire body.
    ///
    /// The body is decoded as the procedure's compiled input message and the
    /// result encoded as its output message.
    pub fn call(&self, procedure: &str, body: &[u8]) -> Result<Vec<u8>> {
        let contract = self.contract();
        let request = contract.decode_request(procedure, body)?;
        let response = self.dispatch(procedure, request)?;
        contract.encode_response(procedure, &response)
    }
}
