//! Bridges one `tokio-tungstenite` stream to a [`Connection`].

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use wsrpc_core::{Connection, Frame, Inbound, Message, Response, RpcError};

use crate::events::{ClientEvent, ClientFault};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a session loop returned.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Stopped locally: the client disconnected or the connection was closed.
    Local,
    /// The server closed the transport.
    Remote,
    /// The transport failed.
    Failed(String),
}

/// Pump frames both ways until either side closes.
///
/// Outbound frames come from the connection's queue; inbound text goes
/// through [`Connection::receive`] and is turned into client signals.
pub(crate) async fn run_session(
    ws: WsStream,
    connection: &Arc<Connection>,
    mut frames: mpsc::Receiver<Frame>,
    events: &broadcast::Sender<ClientEvent>,
    stop: &CancellationToken,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let end = loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break SessionEnd::Local };
                if frame == Frame::Close {
                    break SessionEnd::Local;
                }
                if let Err(err) = ws_tx.send(to_ws_message(frame)).await {
                    break SessionEnd::Failed(err.to_string());
                }
            }
            msg = ws_rx.next() => match msg {
                None | Some(Ok(WsMessage::Close(_))) => break SessionEnd::Remote,
                Some(Err(err)) => break SessionEnd::Failed(err.to_string()),
                Some(Ok(WsMessage::Text(text))) => route(connection, events, text.as_str()),
                Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => route(connection, events, text),
                    Err(_) => emit(events, ClientEvent::Error(ClientFault::Protocol(RpcError::parse_error()))),
                },
                // tungstenite answers pings itself
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => connection.touch(),
                Some(Ok(WsMessage::Frame(_))) => {}
            },
            () = connection.closed() => break SessionEnd::Local,
            () = stop.cancelled() => break SessionEnd::Local,
        }
    };

    if end == SessionEnd::Local {
        // flush what was queued before the close, then say goodbye
        while let Ok(frame) = frames.try_recv() {
            if frame == Frame::Close || ws_tx.send(to_ws_message(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    }
    let _ = ws_tx.close().await;
    end
}

fn route(connection: &Connection, events: &broadcast::Sender<ClientEvent>, text: &str) {
    match connection.receive(text) {
        Inbound::Response { response, matched } => {
            if !matched {
                if let Some(err) = response.error_value() {
                    warn!(code = err.code, message = %err.message, "uncorrelated error response");
                    emit(events, ClientEvent::Error(ClientFault::Remote(err.clone())));
                } else {
                    debug!(id = ?response.id, "uncorrelated response");
                }
            }
            emit(events, ClientEvent::Response(response));
        }
        Inbound::Event(event) => {
            trace!(event = %event.event, "event received");
            emit(events, ClientEvent::Event(event));
        }
        Inbound::Request(request) => {
            debug!(method = %request.method, "server request has no route");
            emit(events, ClientEvent::Error(ClientFault::Protocol(RpcError::unknown_message())));
            if let Some(id) = request.id {
                let reply = Message::Response(Response::error(Some(id), RpcError::unknown_message()));
                if let Err(err) = connection.try_send(&reply) {
                    debug!(error = %err, "error response dropped");
                }
            }
        }
        Inbound::Invalid(err) => {
            warn!(code = err.error.code, "undecodable message from server");
            emit(events, ClientEvent::Error(ClientFault::Protocol(err.error)));
        }
    }
}

fn emit(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    // no subscribers is fine
    let _ = events.send(event);
}

fn to_ws_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Ping(payload) => WsMessage::Ping(payload.into()),
        Frame::Pong(payload) => WsMessage::Pong(payload.into()),
        Frame::Close => WsMessage::Close(None),
    }
}
