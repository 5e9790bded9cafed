//! autorpc - expose plain handler methods as a remote call surface.
//!
//! A handler type lists its remote-callable methods once. From that list the
//! crate synthesizes a minimal RPC contract, serves the methods behind a single
//! dispatcher, and builds client proxies that forward calls to a server when
//! connected and run them in-process otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use autorpc::{Envelope, Exports, HandlerSet, RemoteHandler, RemoteObject};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct TextProcessor;
//!
//! impl RemoteHandler for TextProcessor {
//!     fn export(exports: &mut Exports<Self>) {
//!         exports.method("process", |_this, call| {
//!             let arg: String = call.require(0, "arg")?;
//!             Ok(json!(format!("Processed! (arg='{}')", arg)))
//!         });
//!     }
//! }
//!
//! // Server
//! let handlers = HandlerSet::new().with(Arc::new(TextProcessor));
//! autorpc::serve("text_processor", &handlers, "localhost", 50052, Default::default()).await?;
//!
//! // Client
//! let mut client = RemoteObject::new(TextProcessor);
//! client.connect("text_processor", "localhost", 50052)?;
//! let result = client.call("process", Envelope::new().arg("Some text")).await?;
//! ```

pub mod capability;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod hooks;
pub mod proxy;
pub mod transport;

// Re-export commonly used types
pub use capability::{
    describe, scan, BoundMethod, CapabilitySet, Exports, HandlerResult, HandlerSet,
    MethodDescriptor, OwnerId, RemoteHandler,
};
pub use config::{Endpoint, ServeOptions, TransportConfig};
pub use contract::{synthesize, ContractCompiler, GeneratedContract, ProtoxCompiler};
pub use dispatcher::{AggregateServicer, DispatchTable, ServiceContext};
pub use envelope::Envelope;
pub use error::{AutoRpcError, HandlerError, Result};
pub use hooks::{
    Base64Bytes, JsonEncoder, NumericEncoder, ResponseDecoder, SerializationHooks,
    Utf8BytesDecoder, ValueEncoder,
};
pub use proxy::{ProxyMethod, RemoteError, RemoteObject};
pub use transport::{
    serve, serve_with_shutdown, Channel, ConnectionHandle, HttpChannel, RpcServer,
    RpcServerHandle,
};

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::Arc;

    struct Echo;

    impl RemoteHandler for Echo {
        fn export(exports: &mut Exports<Self>) {
            exports.method("echo", |_, call| {
                let index: u64 = call.require(0, "index")?;
                // Stagger completion so responses finish out of order.
                std::thread::sleep(std::time::Duration::from_millis((index * 7) % 23));
                Ok(json!({ "index": index }))
            });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_paired() {
        let server = RpcServer::start(
            "echo_concurrency",
            &HandlerSet::new().with(Arc::new(Echo)),
            &Endpoint::new("127.0.0.1", 0),
            ServeOptions::default(),
        )
        .await
        .unwrap();

        let mut client = RemoteObject::new(Echo);
        client
            .connect("echo_concurrency", "127.0.0.1", server.port())
            .unwrap();
        let echo = client.method("echo").unwrap();

        let calls = (0..32u64).map(|i| {
            let echo = echo.clone();
            async move { (i, echo.call(Envelope::new().arg(i)).await.unwrap()) }
        });

        for (i, result) in join_all(calls).await {
            assert_eq!(result, json!({ "index": i }));
        }
    }

    #[tokio::test]
    async fn test_two_services_in_one_process() {
        struct Upper;

        impl RemoteHandler for Upper {
            fn export(exports: &mut Exports<Self>) {
                exports.method("upper", |_, call| {
                    let text: String = call.require(0, "text")?;
                    Ok(json!(text.to_uppercase()))
                });
            }
        }

        let echo_server = RpcServer::start(
            "echo_a",
            &HandlerSet::new().with(Arc::new(Echo)),
            &Endpoint::new("127.0.0.1", 0),
            ServeOptions::default(),
        )
        .await
        .unwrap();
        let upper_server = RpcServer::start(
            "upper_b",
            &HandlerSet::new().with(Arc::new(Upper)),
            &Endpoint::new("127.0.0.1", 0),
            ServeOptions::default(),
        )
        .await
        .unwrap();

        let mut echo = RemoteObject::new(Echo);
        echo.connect("echo_a", "127.0.0.1", echo_server.port()).unwrap();
        let mut upper = RemoteObject::new(Upper);
        upper.connect("upper_b", "127.0.0.1", upper_server.port()).unwrap();

        assert_eq!(
            upper.call("upper", Envelope::new().arg("abc")).await.unwrap(),
            json!("ABC")
        );
        assert_eq!(
            echo.call("echo", Envelope::new().arg(1)).await.unwrap(),
            json!({ "index": 1 })
        );
    }
}
