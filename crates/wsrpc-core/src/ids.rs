//! Branded connection identifier.
//!
//! Connection ids are `conn_` followed by a UUID v7, so they sort by accept
//! time and are never confused with a request id.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PREFIX: &str = "conn_";

/// Unique identifier for one live connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a fresh id (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("{PREFIX}{}", Uuid::now_v7()))
    }

    /// Wrap an existing string.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ConnectionId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_prefixed_uuid_v7() {
        let id = ConnectionId::new();
        let raw = id.as_str().strip_prefix("conn_").expect("prefix");
        let parsed = Uuid::parse_str(raw).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn display_and_deref() {
        let id = ConnectionId::from("conn_x");
        assert_eq!(format!("{id}"), "conn_x");
        let s: &str = &id;
        assert_eq!(s, "conn_x");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConnectionId::from("conn_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_abc\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
