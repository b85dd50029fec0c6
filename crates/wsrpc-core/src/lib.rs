//! # wsrpc-core
//!
//! Shared vocabulary for the wsrpc server and client crates.
//!
//! - **Protocol**: `Request`, `Response`, `Event` wire shapes with strict
//!   decode/classification into `PARSE_ERROR` / `INVALID_REQUEST`
//! - **Errors**: numeric RPC error codes, the `RpcError` payload, and the
//!   normalization that turns handler failures into wire errors
//! - **Connection**: outstanding-call table, liveness timestamp, opaque
//!   per-connection state, and the outbound frame channel
//! - **Config / settings**: server and client options with file + env loading
//! - **Retry**: exponential backoff and reconnect budget
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod retry;
pub mod settings;

pub use connection::{CallResult, Connection, ConnectionError, Frame, Inbound};
pub use errors::{ErrorCode, Fault, HandlerError, Normalized, RpcError};
pub use ids::ConnectionId;
pub use protocol::{DecodeError, Event, Message, ProtocolError, Request, RequestId, Response};
