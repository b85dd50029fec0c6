//! RPC error types.
//!
//! The wire error payload ([`RpcError`]), the fixed code registry
//! ([`ErrorCode`]), and the rules that turn a handler failure into a wire
//! error ([`normalize`]).
//!
//! A handler can fail in two ways. A *returned* error ([`HandlerError::Rpc`],
//! [`HandlerError::Failure`]) is a deliberate result and is only mapped onto
//! the wire. A *raised* fault ([`HandlerError::Fault`], or a panic caught by
//! the dispatcher) is mapped the same way and is additionally reported to the
//! server's `error` signal.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::protocol::RequestId;

// ─────────────────────────────────────────────────────────────────────────────
// Error codes
// ─────────────────────────────────────────────────────────────────────────────

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON is not a valid request, response, or event object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal handler error.
pub const INTERNAL_ERROR: i64 = -32603;
/// A well-formed message the receiver has no route for.
pub const UNKNOWN_MESSAGE: i64 = -10000;
/// The call's deadline elapsed before a response arrived.
pub const REQUEST_TIMEOUT: i64 = -10001;
/// The connection closed before the call resolved.
pub const CONNECTION_CLOSED: i64 = -10002;

/// Classified view of a numeric error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `-32700`
    ParseError,
    /// `-32600`
    InvalidRequest,
    /// `-32601`
    MethodNotFound,
    /// `-32602`
    InvalidParams,
    /// `-32603`
    InternalError,
    /// `-10000`
    UnknownMessage,
    /// `-10001`
    RequestTimeout,
    /// `-10002`
    ConnectionClosed,
    /// Any application-chosen code.
    Application(i64),
}

impl ErrorCode {
    /// Numeric wire value.
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => PARSE_ERROR,
            Self::InvalidRequest => INVALID_REQUEST,
            Self::MethodNotFound => METHOD_NOT_FOUND,
            Self::InvalidParams => INVALID_PARAMS,
            Self::InternalError => INTERNAL_ERROR,
            Self::UnknownMessage => UNKNOWN_MESSAGE,
            Self::RequestTimeout => REQUEST_TIMEOUT,
            Self::ConnectionClosed => CONNECTION_CLOSED,
            Self::Application(code) => code,
        }
    }

    /// Canonical message for the code.
    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::UnknownMessage => "Unknown message",
            Self::RequestTimeout => "Request timeout",
            Self::ConnectionClosed => "Connection closed",
            Self::Application(_) => "Application error",
        }
    }

    /// Classify a numeric code.
    pub fn from_code(code: i64) -> Self {
        match code {
            PARSE_ERROR => Self::ParseError,
            INVALID_REQUEST => Self::InvalidRequest,
            METHOD_NOT_FOUND => Self::MethodNotFound,
            INVALID_PARAMS => Self::InvalidParams,
            INTERNAL_ERROR => Self::InternalError,
            UNKNOWN_MESSAGE => Self::UnknownMessage,
            REQUEST_TIMEOUT => Self::RequestTimeout,
            CONNECTION_CLOSED => Self::ConnectionClosed,
            other => Self::Application(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC error
// ─────────────────────────────────────────────────────────────────────────────

/// Structured RPC error, also the `error` member of a response on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error with an arbitrary code.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error carrying the canonical message for `code`.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700 Parse error`.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::from_code(ErrorCode::ParseError)
    }

    /// `-32600 Invalid Request`.
    #[must_use]
    pub fn invalid_request() -> Self {
        Self::from_code(ErrorCode::InvalidRequest)
    }

    /// `-32601 Method not found`.
    #[must_use]
    pub fn method_not_found() -> Self {
        Self::from_code(ErrorCode::MethodNotFound)
    }

    /// `-32602` with a caller-supplied message.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// `-32603 Internal error`.
    #[must_use]
    pub fn internal() -> Self {
        Self::from_code(ErrorCode::InternalError)
    }

    /// `-10000 Unknown message`.
    #[must_use]
    pub fn unknown_message() -> Self {
        Self::from_code(ErrorCode::UnknownMessage)
    }

    /// `-10001 Request timeout`, echoing the timed-out request.
    #[must_use]
    pub fn request_timeout(id: Option<&RequestId>, method: &str) -> Self {
        Self::from_code(ErrorCode::RequestTimeout).with_data(request_data(id, method))
    }

    /// `-10002 Connection closed`.
    #[must_use]
    pub fn connection_closed() -> Self {
        Self::from_code(ErrorCode::ConnectionClosed)
    }

    /// Classified code.
    pub fn kind(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    /// Whether this error classifies a lost connection.
    pub fn is_disconnect(&self) -> bool {
        self.code == CONNECTION_CLOSED
    }

    /// Whether this error classifies an elapsed deadline.
    pub fn is_timeout(&self) -> bool {
        self.code == REQUEST_TIMEOUT
    }
}

/// `{"request": {"id": .., "method": ..}}` details for call-level errors.
pub fn request_data(id: Option<&RequestId>, method: &str) -> Value {
    json!({ "request": { "id": id, "method": method } })
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler failures
// ─────────────────────────────────────────────────────────────────────────────

/// A fault raised by a handler, reported on the server's `error` signal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Fault {
    /// A typed RPC error raised instead of returned.
    #[error("raised {0}")]
    Rpc(RpcError),
    /// Any other error raised by a handler.
    #[error("{0}")]
    Error(Arc<anyhow::Error>),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl Fault {
    /// Wrap an arbitrary error as a raised fault.
    pub fn error(err: impl Into<anyhow::Error>) -> Self {
        Self::Error(Arc::new(err.into()))
    }

    /// Convert a caught panic payload.
    ///
    /// A payload of type [`RpcError`] (see [`std::panic::panic_any`]) is a
    /// raised typed error; string payloads keep their message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<RpcError>() {
            Ok(err) => return Self::Rpc(*err),
            Err(other) => other,
        };
        if let Some(msg) = payload.downcast_ref::<&'static str>() {
            Self::Panic((*msg).to_owned())
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            Self::Panic(msg.clone())
        } else {
            Self::Panic("non-string panic payload".to_owned())
        }
    }

    /// The wire error the caller receives for this fault.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Rpc(err) => err.clone(),
            Self::Error(_) | Self::Panic(_) => RpcError::internal(),
        }
    }
}

impl From<RpcError> for Fault {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

/// Error side of a handler's result.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Returned typed error; sent to the caller verbatim.
    #[error(transparent)]
    Rpc(RpcError),
    /// Returned plain failure; the caller only sees `Internal error`.
    #[error("handler failure: {0}")]
    Failure(anyhow::Error),
    /// Raised fault; mapped like a returned error and escalated.
    #[error("handler fault: {0}")]
    Fault(Fault),
}

impl HandlerError {
    /// Returned plain failure.
    pub fn failure(err: impl Into<anyhow::Error>) -> Self {
        Self::Failure(err.into())
    }

    /// Raise a fault.
    pub fn raise(fault: impl Into<Fault>) -> Self {
        Self::Fault(fault.into())
    }
}

impl From<RpcError> for HandlerError {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failure(err)
    }
}

impl From<Fault> for HandlerError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

/// A handler result after normalization.
#[derive(Clone, Debug)]
pub struct Normalized {
    /// What the caller receives.
    pub outcome: Result<Value, RpcError>,
    /// Set only when the handler raised.
    pub fault: Option<Fault>,
}

/// Apply the normalization rules to a handler result.
pub fn normalize(result: Result<Value, HandlerError>) -> Normalized {
    match result {
        Ok(value) => Normalized {
            outcome: Ok(value),
            fault: None,
        },
        Err(HandlerError::Rpc(err)) => Normalized {
            outcome: Err(err),
            fault: None,
        },
        Err(HandlerError::Failure(err)) => {
            tracing::debug!(error = %err, "handler returned a failure");
            Normalized {
                outcome: Err(RpcError::internal()),
                fault: None,
            }
        }
        Err(HandlerError::Fault(fault)) => Normalized {
            outcome: Err(fault.to_rpc_error()),
            fault: Some(fault),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
