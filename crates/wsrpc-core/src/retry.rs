//! Reconnect backoff math and retry budget.
//!
//! Sync-only building blocks; the client owns the sleeping and the source
//! of randomness.

use std::time::Duration;

use crate::config::ClientConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in ms.
    pub base_delay_ms: u64,
    /// Upper bound on the un-jittered delay, in ms.
    pub max_delay_ms: u64,
    /// Jitter range, 0.0–1.0.
    pub jitter_factor: f64,
}

impl BackoffPolicy {
    /// Policy taken from the client's reconnect settings.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            base_delay_ms: config.reconnect_base_delay_ms,
            max_delay_ms: config.reconnect_max_delay_ms,
            jitter_factor: config.reconnect_jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `min(max, base * 2^attempt) * (1 + (2r - 1) * jitter)`; `random` is
    /// a value in `[0.0, 1.0)`.
    pub fn delay_for(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

/// Calculate backoff delay with explicit randomness.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Budget
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive failed connection attempts against a limit.
///
/// A negative limit never runs out.
#[derive(Clone, Copy, Debug)]
pub struct RetryBudget {
    limit: i32,
    failures: u32,
}

impl RetryBudget {
    /// New budget with no failures recorded.
    pub fn new(limit: i32) -> Self {
        Self { limit, failures: 0 }
    }

    /// Whether the limit is the unbounded sentinel.
    pub fn is_unbounded(&self) -> bool {
        self.limit < 0
    }

    /// Record a failed attempt. Returns `true` if another attempt is allowed.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.is_unbounded() || self.failures <= self.limit.unsigned_abs()
    }

    /// Consecutive failures so far; also the next backoff attempt index.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Forget failures after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
