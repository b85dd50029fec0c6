//! Client lifecycle states.

use std::fmt;

/// Where the client is in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Created, `connect()` not called yet.
    Init,
    /// Opening the transport, or waiting to retry.
    Connecting,
    /// Transport open; calls are issued directly.
    Connected,
    /// Disconnected on request or out of retries. Calls fail immediately.
    Stopped,
}

impl ClientState {
    /// Lowercase name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
