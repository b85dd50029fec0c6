//! Client errors.

use wsrpc_core::ConnectionError;

/// Errors from client lifecycle and raw transport operations.
///
/// Call failures are not here; calls resolve with an `RpcError`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client stopped before reaching `Connected`.
    #[error("client stopped before connecting")]
    Stopped,
    /// There is no live connection to write to.
    #[error("not connected")]
    NotConnected,
    /// The live connection refused the frame.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
