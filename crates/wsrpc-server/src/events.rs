//! Server signals.

use std::net::SocketAddr;
use std::sync::Arc;

use wsrpc_core::{Connection, ConnectionId, Fault, Request, Response, RpcError};

/// Something the server observed, delivered to every subscriber.
#[derive(Clone, Debug)]
pub enum ServerEvent {
    /// The listener is bound.
    Listening(SocketAddr),
    /// A session was accepted.
    Connect(Arc<Connection>),
    /// A session ended and its connection was removed.
    Disconnect(Arc<Connection>),
    /// A request or notification arrived.
    Request {
        /// Receiving connection.
        connection: Arc<Connection>,
        /// The decoded request.
        request: Request,
    },
    /// A response was queued for the peer.
    Response {
        /// Sending connection.
        connection: Arc<Connection>,
        /// The response.
        response: Response,
    },
    /// Something went wrong that the caller should know about.
    Error(ServerFault),
    /// `close()` finished.
    Close,
}

/// Faults surfaced on [`ServerEvent::Error`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum ServerFault {
    /// A handler raised instead of returning.
    #[error("handler for '{method}' raised: {fault}")]
    Handler {
        /// Method whose handler raised.
        method: String,
        /// What was raised.
        fault: Fault,
    },
    /// A peer sent something undecodable or unroutable.
    #[error("protocol error on {connection_id}: {error}")]
    Protocol {
        /// Offending connection.
        connection_id: ConnectionId,
        /// Classified error, also sent back to the peer.
        error: RpcError,
    },
    /// The transport failed.
    #[error("transport error on {connection_id}: {message}")]
    Transport {
        /// Affected connection.
        connection_id: ConnectionId,
        /// Transport's error text.
        message: String,
    },
}
