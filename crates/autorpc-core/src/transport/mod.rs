//! Transport for synthesized contracts.
//!
//! Procedures are served over HTTP; bodies are protobuf messages of the
//! compiled contract.
//!
//! # Architecture
//!
//! - **Server**: hosts an aggregate servicer, one route per contract procedure
//! - **Client**: channel and per-connection contract used by proxies
//! - **Protocol**: wire messages shared by both

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{Channel, ConnectionHandle, HttpChannel};
pub use protocol::{Request, Response, TransportError};
pub use server::{serve, serve_with_shutdown, RpcServer, RpcServerHandle};
