//! One live session with a peer, independent of the transport.
//!
//! A [`Connection`] owns the outbound frame sender, the table of calls it has
//! issued and not yet seen answered, the liveness bookkeeping used by the
//! heartbeat, and an opaque state slot for the embedding application.
//!
//! Every pending call ends in exactly one of three ways: its response
//! arrives, its deadline elapses, or the connection closes. Whichever path
//! removes the entry from the table first decides the outcome.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{RpcError, request_data};
use crate::ids::ConnectionId;
use crate::protocol::{self, DecodeError, Event, Message, ProtocolError, Request, RequestId, Response};

/// Transport-level unit exchanged with the session task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Encoded JSON message.
    Text(String),
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Probe reply.
    Pong(Vec<u8>),
    /// Close the transport.
    Close,
}

/// Outcome of a call: the peer's result or an error.
pub type CallResult = Result<Value, RpcError>;

/// Errors from enqueueing outbound frames.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is closed or its session has gone away.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full (non-blocking sends only).
    #[error("outbound queue full")]
    Full,
    /// The message could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

impl ConnectionError {
    /// Map onto the wire error a caller sees.
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::Closed => RpcError::connection_closed(),
            Self::Full => RpcError::internal().with_data(Value::from("outbound queue full")),
            Self::Encode(err) => RpcError::internal().with_data(Value::from(err.to_string())),
        }
    }
}

/// Result of feeding one inbound text frame to [`Connection::receive`].
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A call or notification to dispatch.
    Request(Request),
    /// A pushed event.
    Event(Event),
    /// A response; `matched` is true when it resolved a pending call.
    Response {
        /// The decoded response.
        response: Response,
        /// Whether a pending call was resolved by it.
        matched: bool,
    },
    /// The frame was rejected.
    Invalid(DecodeError),
}

struct PendingCall {
    method: String,
    tx: oneshot::Sender<CallResult>,
}

type StateSlot = Option<Arc<dyn Any + Send + Sync>>;

/// A live session with one peer.
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    tx: mpsc::Sender<Frame>,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    next_id: AtomicI64,
    connected_at: Instant,
    last_activity: Mutex<Instant>,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
    state: RwLock<StateSlot>,
    closed: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an outbound frame sender.
    pub fn new(remote_addr: Option<SocketAddr>, tx: mpsc::Sender<Frame>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            remote_addr,
            tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            connected_at: now,
            last_activity: Mutex::new(now),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
            state: RwLock::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Create a connection together with the receiving end of its frame
    /// queue, for a session task to drain.
    pub fn channel(capacity: usize, remote_addr: Option<SocketAddr>) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(remote_addr, tx)), rx)
    }

    /// Unique id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Peer address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Encode and enqueue a message, waiting for queue capacity.
    pub async fn send(&self, message: &Message) -> Result<(), ConnectionError> {
        let text = protocol::encode(message)?;
        self.send_frame(Frame::Text(text)).await
    }

    /// Enqueue a raw frame, waiting for queue capacity.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.tx.send(frame).await.map_err(|_| ConnectionError::Closed)
    }

    /// Encode and enqueue a message without waiting.
    ///
    /// A full queue drops the message and bumps [`Self::drop_count`].
    pub fn try_send(&self, message: &Message) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let text = protocol::encode(message)?;
        match self.tx.try_send(Frame::Text(text)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                warn!(connection_id = %self.id, "outbound queue full, message dropped");
                Err(ConnectionError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnectionError::Closed),
        }
    }

    /// Enqueue a raw frame without waiting.
    ///
    /// Unlike [`Self::try_send`] a full queue is not counted as a drop; the
    /// caller decides what a refused frame means.
    pub fn try_send_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ConnectionError::Full,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    /// Total messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Push an event to this peer.
    pub fn emit(&self, event: Event) -> Result<(), ConnectionError> {
        self.try_send(&Message::Event(event))
    }

    /// Send a notification; no pending call is created.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectionError> {
        self.send(&Message::Request(Request::notification(method, params)))
            .await
    }

    /// Call a method on the peer, resolving within `timeout`.
    pub async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> CallResult {
        self.call_until(method, params, Instant::now() + timeout).await
    }

    /// Call a method on the peer, resolving by `deadline`.
    ///
    /// Always completes: with the peer's result or error, `REQUEST_TIMEOUT`
    /// once the deadline passes, or `CONNECTION_CLOSED` if the connection
    /// closes first.
    pub async fn call_until(&self, method: &str, params: Option<Value>, deadline: Instant) -> CallResult {
        if self.is_closed() {
            return Err(closed_error(None, method));
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = oneshot::channel();
        let _ = self.pending.lock().insert(
            id.clone(),
            PendingCall {
                method: method.to_owned(),
                tx,
            },
        );
        let _guard = PendingGuard {
            connection: self,
            id: &id,
        };

        // close() cancels before it drains, so an entry inserted after the
        // drain is caught here
        if self.is_closed() {
            return Err(closed_error(Some(&id), method));
        }

        // queueing counts against the deadline too
        let request = Message::Request(Request::call(id.clone(), method, params));
        match tokio::time::timeout_at(deadline, self.send(&request)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = self.pending.lock().remove(&id);
                return Err(match err {
                    ConnectionError::Closed => closed_error(Some(&id), method),
                    other => other.into_rpc_error(),
                });
            }
            Err(_) => {
                let _ = self.pending.lock().remove(&id);
                debug!(connection_id = %self.id, %id, method, "call timed out waiting for queue capacity");
                return Err(RpcError::request_timeout(Some(&id), method));
            }
        }
        trace!(connection_id = %self.id, %id, method, "call sent");

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(closed_error(Some(&id), method)),
            Err(_) => {
                if self.pending.lock().remove(&id).is_some() {
                    debug!(connection_id = %self.id, %id, method, "call timed out");
                    Err(RpcError::request_timeout(Some(&id), method))
                } else {
                    // a response or close won the race; its value is in flight
                    rx.await.unwrap_or_else(|_| Err(closed_error(Some(&id), method)))
                }
            }
        }
    }

    /// Number of outstanding calls.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Decode one inbound text frame and route it.
    ///
    /// Responses resolve their pending call here; everything else is handed
    /// back to the session.
    pub fn receive(&self, text: &str) -> Inbound {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(err) => return Inbound::Invalid(err),
        };
        self.touch();

        match message {
            Message::Request(request) => Inbound::Request(request),
            Message::Event(event) => Inbound::Event(event),
            Message::Response(response) => {
                let matched = self.resolve(&response);
                Inbound::Response { response, matched }
            }
        }
    }

    fn resolve(&self, response: &Response) -> bool {
        let Some(id) = &response.id else {
            return false;
        };
        let Some(call) = self.pending.lock().remove(id) else {
            trace!(connection_id = %self.id, %id, "response for unknown call");
            return false;
        };
        let _ = call.tx.send(response.outcome.clone());
        true
    }

    // ── Liveness ────────────────────────────────────────────────────

    /// Record inbound activity (message, ping or pong).
    pub fn touch(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat.
    ///
    /// Returns `true` if there was activity since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time of the last inbound activity.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// When the connection was established.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    // ── Opaque state ────────────────────────────────────────────────

    /// Replace the state slot.
    pub fn set_state<T: Any + Send + Sync>(&self, value: T) {
        *self.state.write() = Some(Arc::new(value));
    }

    /// The state, if set and of type `T`.
    pub fn state<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let slot = self.state.read().clone()?;
        slot.downcast::<T>().ok()
    }

    /// Remove and return the state if it is of type `T`.
    pub fn take_state<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut slot = self.state.write();
        if slot.as_ref().is_some_and(|s| s.is::<T>()) {
            slot.take().and_then(|s| s.downcast::<T>().ok())
        } else {
            None
        }
    }

    /// Empty the state slot.
    pub fn clear_state(&self) {
        *self.state.write() = None;
    }

    // ── Close ───────────────────────────────────────────────────────

    /// Whether [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Close the connection. Idempotent.
    ///
    /// Every pending call resolves with `CONNECTION_CLOSED` before this
    /// returns; the session then closes the transport.
    pub fn close(&self) {
        self.closed.cancel();
        let drained: Vec<(RequestId, PendingCall)> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(connection_id = %self.id, count = drained.len(), "failing pending calls on close");
        }
        for (id, call) in drained {
            let _ = call.tx.send(Err(closed_error(Some(&id), &call.method)));
        }
    }
}

fn closed_error(id: Option<&RequestId>, method: &str) -> RpcError {
    RpcError::connection_closed().with_data(request_data(id, method))
}

/// Removes a call's entry when its future is dropped early.
struct PendingGuard<'a> {
    connection: &'a Connection,
    id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.connection.pending.lock().remove(self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CONNECTION_CLOSED, REQUEST_TIMEOUT};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn make_connection() -> (Arc<Connection>, mpsc::Receiver<Frame>) {
        Connection::channel(32, None)
    }

    async fn next_request(rx: &mut mpsc::Receiver<Frame>) -> Request {
        let Some(Frame::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        match protocol::decode(&text).unwrap() {
            Message::Request(r) => r,
            other => panic!("expected request, got {other:?}"),
        }
    }

    fn reply(conn: &Connection, id: &RequestId, result: Value) -> Inbound {
        let text = protocol::encode(&Response::result(id.clone(), result).into()).unwrap();
        conn.receive(&text)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert!(conn.id().starts_with("conn_"));
        assert_eq!(conn.pending_count(), 0);
        assert!(!conn.is_closed());
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
    }

    #[tokio::test]
    async fn call_resolves_with_response() {
        let (conn, mut rx) = make_connection();
        let c = conn.clone();
        let call = tokio::spawn(async move {
            c.call("sum", Some(json!([1, 2])), Duration::from_secs(5)).await
        });

        let req = next_request(&mut rx).await;
        assert_eq!(req.id, Some(RequestId::Number(1)));
        assert_eq!(req.method, "sum");
        assert_eq!(conn.pending_count(), 1);

        let inbound = reply(&conn, req.id.as_ref().unwrap(), json!(3));
        assert_matches!(inbound, Inbound::Response { matched: true, .. });
        assert_eq!(call.await.unwrap(), Ok(json!(3)));
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let (conn, mut rx) = make_connection();
        for expected in 1..=3 {
            let c = conn.clone();
            let _call = tokio::spawn(async move {
                c.call("m", None, Duration::from_secs(5)).await
            });
            let req = next_request(&mut rx).await;
            assert_eq!(req.id, Some(RequestId::Number(expected)));
        }
    }

    #[tokio::test]
    async fn error_response_is_returned() {
        let (conn, mut rx) = make_connection();
        let c = conn.clone();
        let call = tokio::spawn(async move { c.call("m", None, Duration::from_secs(5)).await });
        let req = next_request(&mut rx).await;
        let text = protocol::encode(
            &Response::error(req.id.clone(), RpcError::new(111, "msg1")).into(),
        )
        .unwrap();
        let _ = conn.receive(&text);
        assert_eq!(call.await.unwrap(), Err(RpcError::new(111, "msg1")));
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_with_request_data() {
        let (conn, _rx) = make_connection();
        let err = conn
            .call("test", None, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.code, REQUEST_TIMEOUT);
        assert_eq!(err.message, "Request timeout");
        assert_eq!(err.data, Some(json!({"request": {"id": 1, "method": "test"}})));
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_independent() {
        let (conn, mut rx) = make_connection();
        let short = {
            let c = conn.clone();
            tokio::spawn(async move { c.call("a", None, Duration::from_millis(10)).await })
        };
        let long = {
            let c = conn.clone();
            tokio::spawn(async move { c.call("b", None, Duration::from_secs(1)).await })
        };
        let first = next_request(&mut rx).await;
        let second = next_request(&mut rx).await;
        let long_id = (if first.method == "b" { first.id } else { second.id }).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(short.await.unwrap().unwrap_err().code, REQUEST_TIMEOUT);

        let _ = reply(&conn, &long_id, json!(true));
        assert_eq!(long.await.unwrap(), Ok(json!(true)));
    }

    #[tokio::test]
    async fn late_response_is_unmatched() {
        let (conn, _rx) = make_connection();
        let _ = conn.call("m", None, Duration::from_millis(1)).await;
        let inbound = reply(&conn, &RequestId::Number(1), json!(1));
        assert_matches!(inbound, Inbound::Response { matched: false, .. });
    }

    #[tokio::test]
    async fn close_resolves_every_pending_call() {
        let (conn, mut rx) = make_connection();
        let mut calls = Vec::new();
        for _ in 0..3 {
            let c = conn.clone();
            calls.push(tokio::spawn(async move {
                c.call("slow", None, Duration::from_secs(60)).await
            }));
            let _ = next_request(&mut rx).await;
        }
        assert_eq!(conn.pending_count(), 3);

        conn.close();
        assert_eq!(conn.pending_count(), 0);
        for call in calls {
            let err = call.await.unwrap().unwrap_err();
            assert_eq!(err.code, CONNECTION_CLOSED);
            assert_eq!(err.data.unwrap()["request"]["method"], "slow");
        }
    }

    #[tokio::test]
    async fn call_after_close_fails_immediately() {
        let (conn, _rx) = make_connection();
        conn.close();
        conn.close();
        let err = conn.call("m", None, Duration::from_secs(60)).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn dropped_call_removes_entry() {
        let (conn, mut rx) = make_connection();
        let c = conn.clone();
        let call = tokio::spawn(async move { c.call("m", None, Duration::from_secs(60)).await });
        let _ = next_request(&mut rx).await;
        assert_eq!(conn.pending_count(), 1);
        call.abort();
        let _ = call.await;
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn notify_creates_no_pending_call() {
        let (conn, mut rx) = make_connection();
        conn.notify("test.method", Some(json!([1, 2]))).await.unwrap();
        let req = next_request(&mut rx).await;
        assert!(req.is_notification());
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn emit_sends_event() {
        let (conn, mut rx) = make_connection();
        conn.emit(Event::new("event2", Some(json!({"some": "value"}))))
            .unwrap();
        let Some(Frame::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "event2");
        assert_eq!(v["params"]["some"], "value");
    }

    #[tokio::test]
    async fn emit_to_full_queue_counts_drop() {
        let (conn, _rx) = Connection::channel(1, None);
        conn.emit(Event::new("a", None)).unwrap();
        assert_matches!(conn.emit(Event::new("b", None)), Err(ConnectionError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (conn, _rx) = make_connection();
        conn.close();
        assert_matches!(
            conn.emit(Event::new("a", None)),
            Err(ConnectionError::Closed)
        );
        assert_matches!(
            conn.send_frame(Frame::Ping(vec![])).await,
            Err(ConnectionError::Closed)
        );
    }

    #[test]
    fn receive_routes_requests_and_events() {
        let (conn, _rx) = make_connection();
        assert_matches!(
            conn.receive(r#"{"id":1,"method":"m"}"#),
            Inbound::Request(ref r) if r.method == "m"
        );
        assert_matches!(
            conn.receive(r#"{"event":"e"}"#),
            Inbound::Event(ref e) if e.event == "e"
        );
        assert_matches!(conn.receive("not json"), Inbound::Invalid(_));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_updates_activity() {
        let (conn, _rx) = make_connection();
        let before = conn.last_activity();
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(conn.idle_for(), Duration::from_millis(50));

        let _ = conn.receive(r#"{"event":"e"}"#);
        assert!(conn.last_activity() > before);
        assert_eq!(conn.idle_for(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(50)).await;
        let _ = conn.receive("garbage");
        assert_eq!(conn.idle_for(), Duration::from_millis(50));

        conn.touch();
        assert_eq!(conn.idle_for(), Duration::ZERO);
    }

    #[test]
    fn state_slot_is_typed() {
        #[derive(Debug, PartialEq)]
        struct Session {
            a: u32,
        }

        let (conn, _rx) = make_connection();
        assert!(conn.state::<Session>().is_none());

        conn.set_state(Session { a: 1 });
        assert_eq!(conn.state::<Session>().unwrap().a, 1);
        assert!(conn.state::<String>().is_none());
        assert!(conn.take_state::<String>().is_none());

        let taken = conn.take_state::<Session>().unwrap();
        assert_eq!(*taken, Session { a: 1 });
        assert!(conn.state::<Session>().is_none());

        conn.set_state(5_u8);
        conn.clear_state();
        assert!(conn.state::<u8>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_while_queue_is_full() {
        let (conn, mut rx) = Connection::channel(1, None);
        conn.try_send_frame(Frame::Ping(Vec::new())).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            conn.call("m", None, Duration::from_millis(50)),
        )
        .await
        .expect("call outlived its deadline");

        let err = result.unwrap_err();
        assert_eq!(err.code, REQUEST_TIMEOUT);
        assert_eq!(err.data, Some(json!({"request": {"id": 1, "method": "m"}})));
        assert_eq!(conn.pending_count(), 0);
        // only the frame that filled the queue is there
        assert_eq!(rx.recv().await, Some(Frame::Ping(Vec::new())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn try_send_frame_reports_full_and_closed() {
        let (conn, _rx) = Connection::channel(1, None);
        conn.try_send_frame(Frame::Ping(Vec::new())).unwrap();
        assert_matches!(conn.try_send_frame(Frame::Ping(Vec::new())), Err(ConnectionError::Full));
        assert_eq!(conn.drop_count(), 0);
        conn.close();
        assert_matches!(conn.try_send_frame(Frame::Ping(Vec::new())), Err(ConnectionError::Closed));
    }

    #[test]
    fn connection_error_mapping() {
        assert!(ConnectionError::Closed.into_rpc_error().is_disconnect());
        assert_eq!(ConnectionError::Full.into_rpc_error().code, crate::errors::INTERNAL_ERROR);
    }
}
