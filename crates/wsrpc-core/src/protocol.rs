//! Wire messages and their strict JSON classification.
//!
//! Every inbound text frame decodes to exactly one [`Message`]: a
//! [`Request`] (or notification), a [`Response`], or an [`Event`]. Anything
//! else is a [`DecodeError`] classified as `PARSE_ERROR` or
//! `INVALID_REQUEST`, carrying whatever `id` could be salvaged so the server
//! can still answer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RpcError;

/// Protocol version stamped on every outbound object.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: an integer or a string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id (what this crate allocates).
    Number(i64),
    /// String id (accepted from foreign peers).
    String(String),
}

impl RequestId {
    /// Extract an id from a JSON value, if it is an integer or a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// A method call, or a notification when `id` is `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Correlation id; absent for notifications.
    pub id: Option<RequestId>,
    /// Method name.
    pub method: String,
    /// Positional (array) or named (object) parameters.
    pub params: Option<Value>,
}

impl Request {
    /// A call expecting a response.
    pub fn call(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// A fire-and-forget notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether no response is expected.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The answer to a [`Request`].
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Id of the originating request; may be absent on an error response
    /// that could not be correlated.
    pub id: Option<RequestId>,
    /// Result or structured error.
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    /// Successful response.
    pub fn result(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            id: Some(id.into()),
            outcome: Ok(result),
        }
    }

    /// Error response; `id` is `None` for unsolicited errors.
    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Build from a request id and a normalized outcome.
    pub fn from_outcome(id: RequestId, outcome: Result<Value, RpcError>) -> Self {
        Self {
            id: Some(id),
            outcome,
        }
    }

    /// The result, if successful.
    pub fn result_value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// The error, if failed.
    pub fn error_value(&self) -> Option<&RpcError> {
        self.outcome.as_ref().err()
    }
}

/// A named, uncorrelated push to the peer.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event name.
    pub event: String,
    /// Arbitrary payload.
    pub params: Option<Value>,
}

impl Event {
    /// Create an event.
    pub fn new(event: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            event: event.into(),
            params,
        }
    }

    /// Object form: `{"event": .., "params"?: ..}`.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        let _ = obj.insert("event".into(), Value::from(self.event.as_str()));
        if let Some(params) = &self.params {
            let _ = obj.insert("params".into(), params.clone());
        }
        Value::Object(obj)
    }
}

/// One wire unit.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Call or notification.
    Request(Request),
    /// Answer to a call.
    Response(Response),
    /// Uncorrelated push.
    Event(Event),
}

impl Message {
    /// JSON object form, including the `jsonrpc` member.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        let _ = obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Self::Request(req) => {
                if let Some(id) = &req.id {
                    let _ = obj.insert("id".into(), id.to_value());
                }
                let _ = obj.insert("method".into(), Value::from(req.method.as_str()));
                if let Some(params) = &req.params {
                    let _ = obj.insert("params".into(), params.clone());
                }
            }
            Self::Response(resp) => {
                if let Some(id) = &resp.id {
                    let _ = obj.insert("id".into(), id.to_value());
                }
                match &resp.outcome {
                    Ok(result) => {
                        let _ = obj.insert("result".into(), result.clone());
                    }
                    Err(err) => {
                        let _ = obj.insert("error".into(), error_to_value(err));
                    }
                }
            }
            Self::Event(ev) => {
                let _ = obj.insert("event".into(), Value::from(ev.event.as_str()));
                if let Some(params) = &ev.params {
                    let _ = obj.insert("params".into(), params.clone());
                }
            }
        }
        Value::Object(obj)
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(r) if r.is_notification() => "notification",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<Event> for Message {
    fn from(e: Event) -> Self {
        Self::Event(e)
    }
}

fn error_to_value(err: &RpcError) -> Value {
    let mut obj = Map::new();
    let _ = obj.insert("code".into(), Value::from(err.code));
    let _ = obj.insert("message".into(), Value::from(err.message.as_str()));
    if let Some(data) = &err.data {
        let _ = obj.insert("data".into(), data.clone());
    }
    Value::Object(obj)
}

/// Errors from the encode/decode boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed; nothing was sent.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    /// An inbound message was rejected.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A rejected inbound message.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("invalid message: {error}")]
pub struct DecodeError {
    /// `PARSE_ERROR` or `INVALID_REQUEST`.
    pub error: RpcError,
    /// Id salvaged from the payload, if any.
    pub id: Option<RequestId>,
}

impl DecodeError {
    fn parse() -> Self {
        Self {
            error: RpcError::parse_error(),
            id: None,
        }
    }

    fn invalid(id: Option<RequestId>) -> Self {
        Self {
            error: RpcError::invalid_request(),
            id,
        }
    }

    /// The error response the server sends back for this failure.
    pub fn into_response(self) -> Response {
        Response::error(self.id, self.error)
    }
}

/// Serialize a message to a text frame.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&message.to_value())?)
}

/// Parse and classify a text frame.
pub fn decode(text: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::parse())?;
    let Value::Object(obj) = value else {
        return Err(DecodeError::invalid(None));
    };

    let salvaged = obj.get("id").and_then(RequestId::from_value);
    let invalid = || DecodeError::invalid(salvaged.clone());

    match obj.get("jsonrpc") {
        None => {}
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => return Err(invalid()),
    }

    let params = match obj.get("params") {
        None | Some(Value::Null) => None,
        Some(p) => Some(p.clone()),
    };

    if let Some(method) = obj.get("method") {
        let Value::String(method) = method else {
            return Err(invalid());
        };
        if matches!(params, Some(ref p) if !p.is_array() && !p.is_object()) {
            return Err(invalid());
        }
        let id = match obj.get("id") {
            None => None,
            Some(v) => Some(RequestId::from_value(v).ok_or_else(invalid)?),
        };
        return Ok(Message::Request(Request {
            id,
            method: method.clone(),
            params,
        }));
    }

    if let Some(event) = obj.get("event") {
        let Value::String(event) = event else {
            return Err(invalid());
        };
        if obj.contains_key("id") || obj.contains_key("result") || obj.contains_key("error") {
            return Err(invalid());
        }
        return Ok(Message::Event(Event::new(event.clone(), params)));
    }

    match (obj.get("result"), obj.get("error")) {
        (Some(_), Some(_)) | (None, None) => Err(invalid()),
        (Some(result), None) => {
            let id = obj
                .get("id")
                .and_then(RequestId::from_value)
                .ok_or_else(invalid)?;
            Ok(Message::Response(Response::result(id, result.clone())))
        }
        (None, Some(error)) => {
            let id = match obj.get("id") {
                None | Some(Value::Null) => None,
                Some(v) => Some(RequestId::from_value(v).ok_or_else(invalid)?),
            };
            let error: RpcError =
                serde_json::from_value(error.clone()).map_err(|_| invalid())?;
            Ok(Message::Response(Response::error(id, error)))
        }
    }
}
