//! `RpcClient`: connection lifecycle, reconnect, calls and signals.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use wsrpc_core::config::ClientConfig;
use wsrpc_core::errors::request_data;
use wsrpc_core::retry::{BackoffPolicy, RetryBudget};
use wsrpc_core::{CallResult, Connection, ConnectionError, Frame, RpcError};

use crate::error::ClientError;
use crate::events::{ClientEvent, ClientFault};
use crate::session::{SessionEnd, run_session};
use crate::state::ClientState;

/// Capacity of the signal channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 1024;

/// Per-call overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Overrides `request_timeout_ms` for this call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Options with a specific timeout.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

struct Run {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    url: String,
    config: ClientConfig,
    state: watch::Sender<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    connection: RwLock<Option<Arc<Connection>>>,
    run: Mutex<Option<Run>>,
}

impl Inner {
    fn set_state(&self, next: ClientState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(url = %self.url, state = %next, "client state changed");
            self.emit(ClientEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ClientEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// A JSON-RPC client over WebSocket.
///
/// Cheap to clone; clones share the connection and signals. Must be created
/// and used inside a tokio runtime. The connection task keeps running until
/// [`RpcClient::disconnect`] or until the reconnect budget runs out.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    /// Create a client for `url` (e.g. `ws://127.0.0.1:5005/`).
    ///
    /// With `auto_connect` the client starts connecting immediately.
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ClientState::Init);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let client = Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                state,
                events,
                connection: RwLock::new(None),
                run: Mutex::new(None),
            }),
        };
        if client.inner.config.auto_connect {
            client.start();
        }
        client
    }

    /// Server URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// Subscribe to client signals.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start connecting and return a future that resolves once connected.
    ///
    /// The state moves to `Connecting` before this returns. Calling it while
    /// already connecting or connected only waits.
    pub fn connect(&self) -> impl Future<Output = Result<(), ClientError>> + Send + use<> {
        self.start();
        let client = self.clone();
        async move { client.connected().await }
    }

    /// Resolves once the client is `Connected`; errors if it stops first.
    pub async fn connected(&self) -> Result<(), ClientError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ClientState::Connected | ClientState::Stopped))
            .await
            .map_err(|_| ClientError::Stopped)?;
        match *state {
            ClientState::Connected => Ok(()),
            _ => Err(ClientError::Stopped),
        }
    }

    fn start(&self) {
        let mut run = self.inner.run.lock();
        if run
            .as_ref()
            .is_some_and(|r| !r.stop.is_cancelled() && !r.task.is_finished())
        {
            return;
        }
        let stop = CancellationToken::new();
        self.inner.set_state(ClientState::Connecting);
        let task = tokio::spawn(drive(self.inner.clone(), stop.clone()));
        *run = Some(Run { stop, task });
    }

    /// Close the connection, stop reconnecting, and move to `Stopped`.
    ///
    /// Pending calls fail with `CONNECTION_CLOSED`. `connect()` starts over.
    pub async fn disconnect(&self) {
        let run = self.inner.run.lock().take();
        if let Some(run) = run {
            run.stop.cancel();
            if let Some(connection) = self.current_connection() {
                connection.close();
            }
            if let Err(err) = run.task.await {
                warn!(error = %err, "connection task ended abnormally");
            }
        }
        let run = self.inner.run.lock();
        // a concurrent connect() owns the state now
        if run.is_none() {
            self.inner.set_state(ClientState::Stopped);
        }
    }

    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection.read().clone()
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Call a method with the configured request timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> CallResult {
        self.call_with(method, params, CallOptions::default()).await
    }

    /// Call a method with per-call options.
    ///
    /// While `Connecting` the call waits for the connection, within its own
    /// deadline. Always resolves: with the result, the server's error,
    /// `REQUEST_TIMEOUT` or `CONNECTION_CLOSED`.
    pub async fn call_with(&self, method: &str, params: Option<Value>, options: CallOptions) -> CallResult {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.config.request_timeout());
        let deadline = Instant::now() + timeout;
        let connection = self.wait_connection(method, deadline).await?;
        let result = connection.call_until(method, params, deadline).await;
        if result.as_ref().is_err_and(RpcError::is_timeout) {
            counter!("rpc_client_timeouts_total").increment(1);
        }
        result
    }

    /// Call a method and deserialize its result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T, RpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|err| RpcError::internal().with_data(Value::from(err.to_string())))
    }

    /// Send a notification. Resolves once the frame is queued.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcError> {
        let deadline = Instant::now() + self.inner.config.request_timeout();
        let connection = self.wait_connection(method, deadline).await?;
        connection
            .notify(method, params)
            .await
            .map_err(|err| match err {
                ConnectionError::Closed => closed_error(method),
                other => other.into_rpc_error(),
            })
    }

    async fn wait_connection(&self, method: &str, deadline: Instant) -> Result<Arc<Connection>, RpcError> {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ClientState::Connected => {
                    if let Some(connection) = self.current_connection() {
                        return Ok(connection);
                    }
                }
                ClientState::Init | ClientState::Stopped => return Err(closed_error(method)),
                ClientState::Connecting => {}
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(closed_error(method)),
                Err(_) => return Err(RpcError::request_timeout(None, method)),
            }
        }
    }

    // ── Transport ───────────────────────────────────────────────────

    /// Write a raw text frame, bypassing encoding.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let connection = self.current_connection().ok_or(ClientError::NotConnected)?;
        connection.send_frame(Frame::Text(text.into())).await?;
        Ok(())
    }

    /// Send a liveness probe.
    pub async fn ping(&self, payload: &[u8]) -> Result<(), ClientError> {
        let connection = self.current_connection().ok_or(ClientError::NotConnected)?;
        connection.send_frame(Frame::Ping(payload.to_vec())).await?;
        Ok(())
    }

    /// Last inbound activity on the live connection.
    pub fn last_activity(&self) -> Option<Instant> {
        self.current_connection().map(|c| c.last_activity())
    }

    /// Calls awaiting a response on the live connection.
    pub fn pending_count(&self) -> usize {
        self.current_connection().map_or(0, |c| c.pending_count())
    }
}

fn closed_error(method: &str) -> RpcError {
    RpcError::connection_closed().with_data(request_data(None, method))
}

/// Connect, run the session, and reconnect until stopped or out of budget.
#[instrument(skip_all, fields(url = %inner.url))]
async fn drive(inner: Arc<Inner>, stop: CancellationToken) {
    let policy = BackoffPolicy::from_config(&inner.config);
    let mut budget = RetryBudget::new(inner.config.reconnect_limit);

    loop {
        inner.set_state(ClientState::Connecting);
        let attempt = tokio::select! {
            attempt = connect_async(inner.url.as_str()) => attempt,
            () = stop.cancelled() => break,
        };

        match attempt {
            Ok((ws, _)) => {
                budget.reset();
                let (connection, frames) =
                    Connection::channel(inner.config.send_queue_capacity, None);
                *inner.connection.write() = Some(connection.clone());
                counter!("ws_client_connections_total").increment(1);
                info!(connection_id = %connection.id(), "connected");
                inner.set_state(ClientState::Connected);
                inner.emit(ClientEvent::Connect);

                let end = run_session(ws, &connection, frames, &inner.events, &stop).await;

                connection.close();
                *inner.connection.write() = None;
                info!(connection_id = %connection.id(), reason = ?end, "disconnected");
                inner.emit(ClientEvent::Disconnect);
                if stop.is_cancelled() {
                    break;
                }
                if let SessionEnd::Failed(message) = end {
                    inner.emit(ClientEvent::Error(ClientFault::Transport(message)));
                }
                inner.set_state(ClientState::Connecting);
            }
            Err(err) => {
                warn!(error = %err, failures = budget.failures() + 1, "connect failed");
                inner.emit(ClientEvent::Error(ClientFault::Transport(err.to_string())));
                if !budget.record_failure() {
                    warn!(limit = inner.config.reconnect_limit, "reconnect limit reached");
                    break;
                }
            }
        }

        if stop.is_cancelled() {
            break;
        }
        let delay = policy.delay_for(budget.failures(), rand::random::<f64>());
        debug!(?delay, "reconnecting");
        counter!("ws_client_reconnects_total").increment(1);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = stop.cancelled() => break,
        }
    }

    if !stop.is_cancelled() {
        inner.set_state(ClientState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wsrpc_core::errors::{CONNECTION_CLOSED, REQUEST_TIMEOUT};

    fn manual() -> ClientConfig {
        ClientConfig {
            auto_connect: false,
            ..ClientConfig::default()
        }
    }

    /// A port nothing listens on.
    async fn dead_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/")
    }

    #[tokio::test]
    async fn starts_in_init_without_auto_connect() {
        let client = RpcClient::new("ws://127.0.0.1:1/", manual());
        assert_eq!(client.state(), ClientState::Init);
        assert_eq!(client.url(), "ws://127.0.0.1:1/");
        assert!(client.last_activity().is_none());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn calls_fail_fast_when_not_started() {
        let client = RpcClient::new("ws://127.0.0.1:1/", manual());
        let err = client.call("sum", None).await.unwrap_err();
        assert_eq!(err.code, CONNECTION_CLOSED);
        assert_eq!(err.data, Some(json!({"request": {"id": null, "method": "sum"}})));
        assert_eq!(client.notify("sum", None).await.unwrap_err().code, CONNECTION_CLOSED);
        assert_matches!(client.send_text("x").await, Err(ClientError::NotConnected));
        assert_matches!(client.ping(b"aaa").await, Err(ClientError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_before_connect_stops() {
        let client = RpcClient::new("ws://127.0.0.1:1/", manual());
        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Stopped);
        assert_eq!(client.call("sum", None).await.unwrap_err().code, CONNECTION_CLOSED);
    }

    #[tokio::test]
    async fn exhausted_budget_stops() {
        let config = ClientConfig {
            reconnect_limit: 1,
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 2,
            ..manual()
        };
        let client = RpcClient::new(dead_url().await, config);
        let mut events = client.subscribe();

        assert_matches!(client.connect().await, Err(ClientError::Stopped));
        assert_eq!(client.state(), ClientState::Stopped);

        let mut transport_errors = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ClientEvent::Error(ClientFault::Transport(_))) {
                transport_errors += 1;
            }
        }
        // first attempt plus one retry
        assert_eq!(transport_errors, 2);
    }

    #[tokio::test]
    async fn call_while_connecting_times_out_without_id() {
        // accepts TCP but never completes the handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let client = RpcClient::new(url, ClientConfig::default());
        assert_eq!(client.state(), ClientState::Connecting);

        let err = client
            .call_with("test", None, CallOptions::timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err.code, REQUEST_TIMEOUT);
        assert_eq!(err.message, "Request timeout");
        assert_eq!(err.data, Some(json!({"request": {"id": null, "method": "test"}})));

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Stopped);
        drop(listener);
    }

    #[tokio::test]
    async fn state_changes_are_signalled() {
        let client = RpcClient::new(dead_url().await, ClientConfig {
            reconnect_limit: 0,
            ..manual()
        });
        let mut events = client.subscribe();
        let _ = client.connect().await;

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(states, vec![ClientState::Connecting, ClientState::Stopped]);
    }

    #[test]
    fn call_options() {
        assert_eq!(CallOptions::default().timeout, None);
        assert_eq!(
            CallOptions::timeout(Duration::from_millis(10)).timeout,
            Some(Duration::from_millis(10))
        );
    }
}
