//! # wsrpc-server
//!
//! JSON-RPC 2.0 over WebSocket, server side.
//!
//! - **Registry**: method name to async handler, with failure normalization
//! - **Sessions**: one axum WebSocket task per peer, requests dispatched
//!   concurrently, responses queued through the peer's [`Connection`]
//! - **Heartbeat**: ping probes, silent peers are disconnected
//! - **Signals**: `Listening`, `Connect`, `Disconnect`, `Request`,
//!   `Response`, `Error` and `Close` on a broadcast channel
//!
//! [`Connection`]: wsrpc_core::Connection

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod heartbeat;
pub mod registry;
pub mod server;
mod session;
pub mod shutdown;

pub use error::{RegistryError, ServerError};
pub use events::{ServerEvent, ServerFault};
pub use registry::{FnHandler, MethodHandler, MethodRegistry};
pub use server::RpcServer;
pub use wsrpc_core::config::ServerConfig;
