//! Server and client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for an RPC server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between liveness probes, in ms.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is considered dead, in ms.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frame queue depth per connection.
    pub send_queue_capacity: usize,
    /// Upper bound on waiting for sessions to drain in `close()`, in ms.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Heartbeat timeout, never shorter than one interval.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.max(self.heartbeat_interval_ms.max(1)))
    }

    /// Drain bound for `close()`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Configuration for an RPC client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Consecutive failed connection attempts allowed before stopping.
    /// Negative means unlimited.
    pub reconnect_limit: i32,
    /// Default per-call timeout, in ms.
    pub request_timeout_ms: u64,
    /// Start connecting as soon as the client is created.
    pub auto_connect: bool,
    /// First reconnect delay, in ms.
    pub reconnect_base_delay_ms: u64,
    /// Cap on the reconnect delay, in ms.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect jitter factor, 0.0–1.0.
    pub reconnect_jitter: f64,
    /// Outbound frame queue depth.
    pub send_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_limit: -1,
            request_timeout_ms: 30_000,
            auto_connect: true,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 5_000,
            reconnect_jitter: 0.2,
            send_queue_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Default per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Both halves, as stored in a settings file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server options.
    pub server: ServerConfig,
    /// Client options.
    pub client: ClientConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
        assert_eq!(cfg.heartbeat_timeout_ms, 90_000);
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert_eq!(cfg.send_queue_capacity, 1024);
        assert_eq!(cfg.shutdown_timeout_ms, 5_000);
    }

    #[test]
    fn client_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.reconnect_limit, -1);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert!(cfg.auto_connect);
        assert_eq!(cfg.reconnect_base_delay_ms, 100);
        assert_eq!(cfg.reconnect_max_delay_ms, 5_000);
    }

    #[test]
    fn heartbeat_timeout_at_least_one_interval() {
        let cfg = ServerConfig {
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 10,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port":3000}"#).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "127.0.0.1");

        let settings: Settings =
            serde_json::from_str(r#"{"client":{"auto_connect":false}}"#).unwrap();
        assert!(!settings.client.auto_connect);
        assert_eq!(settings.client.reconnect_limit, -1);
        assert_eq!(settings.server, ServerConfig::default());
    }

    #[test]
    fn serde_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
