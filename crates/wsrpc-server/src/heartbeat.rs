//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use wsrpc_core::{Connection, ConnectionError, Frame};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stayed silent for the whole timeout window.
    TimedOut,
    /// The probe could not be queued; the connection is gone.
    Closed,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Probe a connection every `interval` until it goes quiet.
///
/// Each tick checks the connection's alive flag (set by any inbound
/// message, ping or pong) and then queues a ping without waiting for
/// queue capacity. Once `timeout / interval`
/// consecutive ticks (at least one) see no activity the connection is
/// considered dead.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // skip the immediate first tick
    let _ = ticker.tick().await;

    #[allow(clippy::cast_possible_truncation)]
    let max_missed = (timeout.as_millis() / interval.as_millis()).max(1) as u32;
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                // a stuck writer leaves the queue full; the ping is skipped and the tick counts as missed
                match connection.try_send_frame(Frame::Ping(Vec::new())) {
                    Ok(()) | Err(ConnectionError::Full) => {}
                    Err(_) => return HeartbeatResult::Closed,
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
