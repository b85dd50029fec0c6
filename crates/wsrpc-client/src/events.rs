//! Client signals.

use wsrpc_core::{Event, Response, RpcError};

use crate::state::ClientState;

/// Something the client observed, delivered to every subscriber.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// The transport opened.
    Connect,
    /// The transport closed; pending calls have been failed.
    Disconnect,
    /// The server pushed an event.
    Event(Event),
    /// Something went wrong that the caller should know about.
    Error(ClientFault),
    /// A response arrived, correlated or not.
    Response(Response),
    /// The lifecycle state changed.
    StateChanged(ClientState),
}

/// Faults surfaced on [`ClientEvent::Error`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ClientFault {
    /// The server sent an error response no call was waiting for.
    #[error("remote error: {0}")]
    Remote(RpcError),
    /// An inbound message could not be decoded or routed.
    #[error("protocol error: {0}")]
    Protocol(RpcError),
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientFault {
    /// The RPC error carried, if any.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Remote(err) | Self::Protocol(err) => Some(err),
            Self::Transport(_) => None,
        }
    }
}
