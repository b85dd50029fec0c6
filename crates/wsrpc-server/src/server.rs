//! `RpcServer`: axum WebSocket gateway, connection set, dispatch, signals.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use metrics::gauge;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use wsrpc_core::config::ServerConfig;
use wsrpc_core::{
    Connection, ConnectionId, Event, HandlerError, Message, Request as RpcRequest, Response, RpcError,
};

use crate::error::{RegistryError, ServerError};
use crate::events::{ServerEvent, ServerFault};
use crate::registry::{MethodHandler, MethodRegistry};
use crate::session::run_ws_session;
use crate::shutdown::ShutdownCoordinator;

/// Capacity of the signal channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 1024;

struct Inner {
    config: ServerConfig,
    registry: MethodRegistry,
    connections: RwLock<Vec<Arc<Connection>>>,
    events: broadcast::Sender<ServerEvent>,
    shutdown: ShutdownCoordinator,
    close_emitted: AtomicBool,
}

/// A JSON-RPC server over WebSocket.
///
/// Cheap to clone; clones share the registry, connection set and signals.
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<Inner>,
}

impl RpcServer {
    /// Create a server that is not yet listening.
    pub fn new(config: ServerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: MethodRegistry::new(),
                connections: RwLock::new(Vec::new()),
                events,
                shutdown: ShutdownCoordinator::new(),
                close_emitted: AtomicBool::new(false),
            }),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Method registry.
    pub fn registry(&self) -> &MethodRegistry {
        &self.inner.registry
    }

    /// Subscribe to server signals.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ServerEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn shutdown(&self) -> &ShutdownCoordinator {
        &self.inner.shutdown
    }

    /// Whether `close()` has begun.
    pub fn is_closing(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    // ── Registration ────────────────────────────────────────────────

    /// Bind a handler to a method name.
    pub fn register_method(
        &self,
        name: &str,
        handler: impl MethodHandler + 'static,
    ) -> Result<(), RegistryError> {
        self.inner.registry.register(name, handler)
    }

    /// Bind a closure to a method name.
    pub fn register_fn<F, Fut>(&self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.inner.registry.register_fn(name, f)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Invoke a registered method in-process, without wire framing.
    ///
    /// Same normalization and escalation as a remote call.
    pub async fn call_method(&self, name: &str, params: Option<Value>) -> Result<Value, RpcError> {
        self.dispatch(name, params).await
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let normalized = self.inner.registry.invoke(method, params).await;
        if let Some(fault) = normalized.fault {
            error!(method, %fault, "handler raised");
            self.emit(ServerEvent::Error(ServerFault::Handler {
                method: method.to_owned(),
                fault,
            }));
        }
        normalized.outcome
    }

    /// Run a request on its own task and queue the response, if any.
    pub(crate) fn spawn_dispatch(&self, connection: Arc<Connection>, request: RpcRequest) {
        let server = self.clone();
        let _ = self.inner.shutdown.spawn(async move {
            let RpcRequest { id, method, params } = request;
            let outcome = server.dispatch(&method, params).await;
            let Some(id) = id else {
                return;
            };
            let response = Response::from_outcome(id, outcome);
            match connection.send(&Message::Response(response.clone())).await {
                Ok(()) => server.emit(ServerEvent::Response {
                    connection,
                    response,
                }),
                Err(err) => {
                    debug!(connection_id = %connection.id(), method = %method, error = %err, "response dropped");
                }
            }
        });
    }

    // ── Connections ─────────────────────────────────────────────────

    /// Live connections in accept order.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.connections.read().clone()
    }

    /// Look up a live connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner
            .connections
            .read()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    pub(crate) fn add_connection(&self, connection: Arc<Connection>) {
        let count = {
            let mut connections = self.inner.connections.write();
            connections.push(connection.clone());
            connections.len()
        };
        info!(connection_id = %connection.id(), remote_addr = ?connection.remote_addr(), count, "client connected");
        #[allow(clippy::cast_precision_loss)]
        gauge!("ws_connections_active").set(count as f64);
        self.emit(ServerEvent::Connect(connection));
    }

    pub(crate) fn remove_connection(&self, connection: &Arc<Connection>) {
        let (removed, count) = {
            let mut connections = self.inner.connections.write();
            let before = connections.len();
            connections.retain(|c| !Arc::ptr_eq(c, connection));
            (connections.len() != before, connections.len())
        };
        if removed {
            info!(connection_id = %connection.id(), count, "client disconnected");
            #[allow(clippy::cast_precision_loss)]
            gauge!("ws_connections_active").set(count as f64);
            self.emit(ServerEvent::Disconnect(connection.clone()));
        }
    }

    /// Push an event to every live connection. Returns how many accepted it.
    pub fn broadcast(&self, event: &Event) -> usize {
        self.connections()
            .iter()
            .filter(|c| c.emit(event.clone()).is_ok())
            .count()
    }

    // ── Serving ─────────────────────────────────────────────────────

    /// Axum router accepting WebSocket upgrades on `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .with_state(self.clone())
    }

    /// Bind `host:port` and serve in the background.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        if self.is_closing() {
            return Err(ServerError::Closed);
        }
        let listener = TcpListener::bind(self.config().bind_addr()).await?;
        let addr = listener.local_addr()?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.inner.shutdown.token();
        let _ = self.inner.shutdown.spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                warn!(error = %err, "listener stopped with error");
            }
        });

        info!(%addr, "wsrpc server listening");
        self.emit(ServerEvent::Listening(addr));
        Ok(addr)
    }

    /// Stop accepting, close every connection, wait for sessions to drain,
    /// then emit [`ServerEvent::Close`] once.
    pub async fn close(&self) {
        if self.inner.close_emitted.load(Ordering::Acquire) {
            return;
        }
        info!("closing server");
        self.inner.shutdown.shutdown();
        for connection in self.connections() {
            connection.close();
        }
        let drained = self
            .inner
            .shutdown
            .graceful_shutdown(self.config().shutdown_timeout())
            .await;
        if !drained {
            warn!("sessions did not drain before the shutdown timeout");
        }
        if !self.inner.close_emitted.swap(true, Ordering::AcqRel) {
            self.emit(ServerEvent::Close);
        }
    }
}

/// GET / with `Upgrade: websocket`.
async fn ws_handler(State(server): State<RpcServer>, request: Request) -> HttpResponse {
    let (mut parts, _body) = request.into_parts();
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &server).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_message_size = server.config().max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let session = run_ws_session(server.clone(), socket, remote_addr);
            server.shutdown().track(session)
        })
}
