//! # wsrpc-client
//!
//! JSON-RPC 2.0 over WebSocket, client side.
//!
//! - **State machine**: `Init → Connecting → Connected → Stopped`, with
//!   automatic reconnect (exponential backoff, bounded by `reconnect_limit`)
//! - **Calls**: `call` / `call_with` / `call_as` always resolve, with the
//!   result, the peer's error, `REQUEST_TIMEOUT` or `CONNECTION_CLOSED`
//! - **Signals**: `Connect`, `Disconnect`, `Event`, `Error`, `Response` and
//!   `StateChanged` on a broadcast channel

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod events;
mod session;
pub mod state;

pub use client::{CallOptions, RpcClient};
pub use error::ClientError;
pub use events::{ClientEvent, ClientFault};
pub use state::ClientState;
pub use wsrpc_core::config::ClientConfig;
