//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `WSRPC_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::Settings;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings value was invalid.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Load settings from `path` with process environment overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, resolving overrides through `lookup`.
pub fn load_settings_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides_with(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WSRPC_*` overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is
/// logged and ignored.
pub fn apply_env_overrides_with(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("WSRPC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_with(&read, "WSRPC_PORT", |v| parse_u16_range(v, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = read_with(&read, "WSRPC_HEARTBEAT_INTERVAL_MS", |v| {
        parse_u64_range(v, 10, 3_600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_with(&read, "WSRPC_HEARTBEAT_TIMEOUT_MS", |v| {
        parse_u64_range(v, 10, 3_600_000)
    }) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = read_with(&read, "WSRPC_REQUEST_TIMEOUT_MS", |v| {
        parse_u64_range(v, 1, 3_600_000)
    }) {
        settings.client.request_timeout_ms = v;
    }
    if let Some(v) = read_with(&read, "WSRPC_RECONNECT_LIMIT", |v| {
        parse_i32_range(v, -1, 1_000_000)
    }) {
        settings.client.reconnect_limit = v;
    }
    if let Some(v) = read_with(&read, "WSRPC_AUTO_CONNECT", parse_bool) {
        settings.client.auto_connect = v;
    }
}

fn read_with<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.server.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeat_interval_ms must be positive".into(),
        ));
    }
    if settings.server.send_queue_capacity == 0 || settings.client.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "send_queue_capacity must be positive".into(),
        ));
    }
    if !(0.0..=1.0).contains(&settings.client.reconnect_jitter) {
        return Err(SettingsError::InvalidValue(format!(
            "client.reconnect_jitter {} outside 0.0..=1.0",
            settings.client.reconnect_jitter
        )));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `i32` within a range.
pub fn parse_i32_range(val: &str, min: i32, max: i32) -> Option<i32> {
    let n: i32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
