//! HTTP server hosting an aggregate servicer.
//!
//! Each call runs its handler on the blocking worker pool. A global
//! concurrency limit bounds the number of calls in flight to the configured
//! worker pool size; calls are otherwise unordered.
//!
//! # Thread Safety
//!
//! Handler instances are shared across workers behind `Arc` without any
//! locking by the server. Handlers that mutate state synchronize internally.

use super::protocol::TransportError;
use crate::capability::HandlerSet;
use crate::config::{Endpoint, ServeOptions, TransportConfig};
use crate::contract::GeneratedContract;
use crate::dispatcher::{AggregateServicer, ServiceContext};
use crate::error::HandlerError;
use crate::{AutoRpcError, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Handle to a running server. Dropping shuts the server down.
pub struct RpcServerHandle {
    pub addr: SocketAddr,
    contract: Arc<GeneratedContract>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Contract the server was started with.
    pub fn contract(&self) -> &GeneratedContract {
        &self.contract
    }

    /// Stop accepting calls and let in-flight calls finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait until the server task has exited.
    pub async fn wait(mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Server task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Server entry points.
pub struct RpcServer;

impl RpcServer {
    /// Build the service context for `handlers` and serve it in the background.
    ///
    /// Returns once the listener is bound; port 0 picks a free port.
    pub async fn start(
        service_name: &str,
        handlers: &HandlerSet,
        endpoint: &Endpoint,
        options: ServeOptions,
    ) -> Result<RpcServerHandle> {
        let context = ServiceContext::build(service_name, handlers)?;
        let contract = Arc::clone(&context.contract);
        let servicer = Arc::new(AggregateServicer::new(context));

        let app = Self::router(servicer, &options);

        let listener = tokio::net::TcpListener::bind(endpoint.authority())
            .await
            .map_err(|e| AutoRpcError::Connection {
                endpoint: endpoint.to_string(),
                message: format!("failed to bind: {}", e),
                cause: None,
            })?;
        let addr = listener.local_addr()?;

        info!(
            "{}: serving {} procedures on {} (workers={})",
            service_name,
            contract.procedures.len(),
            addr,
            options.worker_pool_size
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let name = service_name.to_string();
        let task_handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            match result {
                Ok(()) => info!("{}: server stopped", name),
                Err(e) => error!("{}: server error: {}", name, e),
            }
        });

        Ok(RpcServerHandle {
            addr,
            contract,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }

    fn router(servicer: Arc<AggregateServicer>, options: &ServeOptions) -> Router {
        // Only procedure calls count against the worker pool.
        let calls: Router<Arc<AggregateServicer>> = Router::new()
            .route("/:service/:procedure", post(handle_call))
            .route_layer(GlobalConcurrencyLimitLayer::new(options.worker_pool_size.max(1)));

        Router::new()
            .route(TransportConfig::HEALTH_PATH, get(handle_health))
            .merge(calls)
            .layer(DefaultBodyLimit::max(options.max_message_size))
            .layer(TraceLayer::new_for_http())
            .with_state(servicer)
    }
}

/// Serve `handlers` until Ctrl-C.
///
/// `AUTORPC_HOST` / `AUTORPC_PORT` override `host` / `port`.
pub async fn serve(
    service_name: &str,
    handlers: &HandlerSet,
    host: &str,
    port: u16,
    options: ServeOptions,
) -> Result<()> {
    serve_with_shutdown(service_name, handlers, host, port, options, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await
}

/// Serve `handlers` until `signal` completes.
pub async fn serve_with_shutdown<F>(
    service_name: &str,
    handlers: &HandlerSet,
    host: &str,
    port: u16,
    options: ServeOptions,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let endpoint = Endpoint::resolve(host, port)?;
    info!("{}: Starting server...", service_name);

    let mut handle = RpcServer::start(service_name, handlers, &endpoint, options).await?;
    info!("{}: Server started! port={}", service_name, handle.port());

    signal.await;
    info!("Shutdown signal received, stopping {}", service_name);

    handle.shutdown();
    handle.wait().await;
    Ok(())
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn status_for(err: &AutoRpcError) -> StatusCode {
    match err {
        AutoRpcError::UnknownCapability(_) => StatusCode::NOT_FOUND,
        AutoRpcError::InvalidEnvelope { .. }
        | AutoRpcError::Encoding { .. }
        | AutoRpcError::Json { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: &AutoRpcError) -> axum::response::Response {
    (status_for(err), Json(TransportError::from(err))).into_response()
}

/// Procedure endpoint.
async fn handle_call(
    State(servicer): State<Arc<AggregateServicer>>,
    Path((service, procedure)): Path<(String, String)>,
    body: Bytes,
) -> axum::response::Response {
    if service != servicer.contract().qualified_service() {
        return failure(&AutoRpcError::UnknownCapability(format!(
            "{}/{}",
            service, procedure
        )));
    }

    debug!("RPC call: {}", procedure);

    let worker = Arc::clone(&servicer);
    let name = procedure.clone();
    let result = tokio::task::spawn_blocking(move || worker.call(&name, &body)).await;

    match result {
        Ok(Ok(message)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TransportConfig::MESSAGE_CONTENT_TYPE)],
            message,
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("RPC error for {}: {}", procedure, e);
            failure(&e)
        }
        Err(e) => {
            error!("RPC worker for {} failed: {}", procedure, e);
            failure(&AutoRpcError::Handler {
                capability: procedure,
                source: HandlerError::new("panic", e.to_string()),
            })
        }
    }
}
