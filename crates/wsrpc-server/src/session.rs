//! WebSocket session lifecycle: handles one connected peer from upgrade
//! through disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info, instrument, warn};

use wsrpc_core::{Connection, DecodeError, Frame, Inbound, Message, Response, RpcError};

use crate::events::{ServerEvent, ServerFault};
use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::server::RpcServer;

/// How long the writer may take to flush queued frames after close.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run a WebSocket session for a connected peer.
///
/// 1. Registers a [`Connection`] with the server (`Connect` signal)
/// 2. Forwards the connection's outbound frames to the socket
/// 3. Probes liveness and closes unresponsive peers
/// 4. Routes inbound frames: requests are dispatched on their own tasks,
///    undecodable input is answered with an error response
/// 5. Closes the connection and deregisters it (`Disconnect` signal)
#[instrument(skip_all, fields(connection_id = field::Empty, remote_addr = ?remote_addr))]
pub(crate) async fn run_ws_session(server: RpcServer, socket: WebSocket, remote_addr: Option<SocketAddr>) {
    if server.is_closing() {
        debug!("server closing, refusing session");
        let mut socket = socket;
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    let config = server.config();
    let (connection, frames) = Connection::channel(config.send_queue_capacity, remote_addr);
    let _ = tracing::Span::current().record("connection_id", field::display(connection.id()));

    let connection_start = Instant::now();
    counter!("ws_connections_total").increment(1);
    server.add_connection(connection.clone());

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_frames(ws_tx, frames, connection.clone()));

    let heartbeat_cancel = CancellationToken::new();
    let heartbeat = {
        let connection = connection.clone();
        let cancel = heartbeat_cancel.clone();
        let interval = config.heartbeat_interval();
        let timeout = config.heartbeat_timeout();
        tokio::spawn(async move {
            if run_heartbeat(connection.clone(), interval, timeout, cancel).await
                == HeartbeatResult::TimedOut
            {
                warn!(connection_id = %connection.id(), "peer unresponsive for {timeout:?}, disconnecting");
                connection.close();
            }
        })
    };

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = connection.closed() => break,
        };

        match msg {
            None => {
                debug!("peer went away");
                break;
            }
            Some(Err(err)) => {
                if !server.is_closing() {
                    warn!(error = %err, "transport error");
                    server.emit(ServerEvent::Error(ServerFault::Transport {
                        connection_id: connection.id().clone(),
                        message: err.to_string(),
                    }));
                }
                break;
            }
            Some(Ok(WsMessage::Text(text))) => handle_text(&server, &connection, text.as_str()).await,
            Some(Ok(WsMessage::Binary(data))) => {
                // binary frames are accepted when they carry UTF-8 JSON
                if let Ok(text) = std::str::from_utf8(&data) {
                    handle_text(&server, &connection, text).await;
                } else {
                    let err = DecodeError {
                        error: RpcError::parse_error(),
                        id: None,
                    };
                    reject(&server, &connection, err).await;
                }
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => connection.touch(),
            Some(Ok(WsMessage::Close(_))) => {
                debug!("peer sent close frame");
                break;
            }
        }
    }

    heartbeat_cancel.cancel();
    connection.close();
    let _ = tokio::time::timeout(WRITER_DRAIN, writer).await;
    let _ = heartbeat.await;

    server.remove_connection(&connection);
    counter!("ws_disconnections_total").increment(1);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    info!(pending = connection.pending_count(), "session ended");
}

async fn handle_text(server: &RpcServer, connection: &Arc<Connection>, text: &str) {
    match connection.receive(text) {
        Inbound::Request(request) => {
            server.emit(ServerEvent::Request {
                connection: connection.clone(),
                request: request.clone(),
            });
            server.spawn_dispatch(connection.clone(), request);
        }
        Inbound::Invalid(err) => reject(server, connection, err).await,
        Inbound::Event(event) => {
            debug!(event = %event.event, "peer pushed an event; no route");
            let err = DecodeError {
                error: RpcError::unknown_message(),
                id: None,
            };
            reject(server, connection, err).await;
        }
        Inbound::Response { response, matched } => {
            if !matched {
                debug!(id = ?response.id, "uncorrelated response ignored");
            }
        }
    }
}

/// Report an unusable inbound message locally and answer the peer.
async fn reject(server: &RpcServer, connection: &Connection, err: DecodeError) {
    warn!(code = err.error.code, message = %err.error.message, "rejected inbound message");
    counter!("ws_protocol_errors_total").increment(1);
    server.emit(ServerEvent::Error(ServerFault::Protocol {
        connection_id: connection.id().clone(),
        error: err.error.clone(),
    }));
    let response: Response = err.into_response();
    if let Err(e) = connection.send(&Message::Response(response)).await {
        debug!(error = %e, "error response dropped");
    }
}

/// Forward queued frames to the socket until the connection closes, then
/// flush what is left and send a close frame.
async fn write_frames(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut frames: mpsc::Receiver<Frame>,
    connection: Arc<Connection>,
) {
    loop {
        tokio::select! {
            biased;
            frame = frames.recv() => {
                match frame {
                    Some(Frame::Close) | None => break,
                    Some(frame) => {
                        if sink.send(to_ws_message(frame)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            () = connection.closed() => {
                while let Ok(frame) = frames.try_recv() {
                    if frame == Frame::Close || sink.send(to_ws_message(frame)).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = sink.close().await;
}

fn to_ws_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Ping(payload) => WsMessage::Ping(payload.into()),
        Frame::Pong(payload) => WsMessage::Pong(payload.into()),
        Frame::Close => WsMessage::Close(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_map_to_ws_messages() {
        assert!(matches!(
            to_ws_message(Frame::Text("{}".into())),
            WsMessage::Text(ref t) if t.as_str() == "{}"
        ));
        assert!(matches!(
            to_ws_message(Frame::Ping(b"aaa".to_vec())),
            WsMessage::Ping(ref p) if &p[..] == b"aaa"
        ));
        assert!(matches!(to_ws_message(Frame::Pong(Vec::new())), WsMessage::Pong(_)));
        assert!(matches!(to_ws_message(Frame::Close), WsMessage::Close(None)));
    }
}
