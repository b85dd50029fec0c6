//! Method registry and async dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use wsrpc_core::errors::{Fault, HandlerError, Normalized, RpcError, normalize};

use crate::error::RegistryError;

/// Requests slower than this are logged.
const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the request's params.
    async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError>;
}

/// Adapts a closure returning a future into a [`MethodHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        (self.0)(params).await
    }
}

/// Registry mapping method names to handlers.
///
/// Registration takes the write lock; dispatch only clones the handler out
/// under the read lock, so handlers run concurrently.
pub struct MethodRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a handler to a method name. An existing binding is kept.
    pub fn register(
        &self,
        method: &str,
        handler: impl MethodHandler + 'static,
    ) -> Result<(), RegistryError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(method) {
            return Err(RegistryError::DuplicateMethod(method.to_owned()));
        }
        let _ = handlers.insert(method.to_owned(), Arc::new(handler));
        debug!(method, "method registered");
        Ok(())
    }

    /// Bind a closure as a handler.
    pub fn register_fn<F, Fut>(&self, method: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(method, FnHandler(f))
    }

    /// Run the handler for `method` and normalize its outcome.
    ///
    /// Unknown methods yield `METHOD_NOT_FOUND`. A panicking handler is
    /// treated as a raised fault.
    pub async fn invoke(&self, method: &str, params: Option<Value>) -> Normalized {
        counter!("rpc_requests_total", "method" => method.to_owned()).increment(1);

        let handler = self.handlers.read().get(method).cloned();
        let Some(handler) = handler else {
            counter!("rpc_errors_total", "method" => method.to_owned(), "error_type" => "method_not_found").increment(1);
            return Normalized {
                outcome: Err(RpcError::method_not_found()),
                fault: None,
            };
        };

        let start = Instant::now();
        let result = match AssertUnwindSafe(handler.handle(params)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Fault(Fault::from_panic(payload))),
        };
        let normalized = normalize(result);

        if let Err(err) = &normalized.outcome {
            counter!("rpc_errors_total", "method" => method.to_owned(), "error_type" => err.code.to_string()).increment(1);
        }

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.to_owned())
            .record(duration.as_secs_f64());

        if duration >= SLOW_REQUEST {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        normalized
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wsrpc_core::errors::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};

    // ── Test handler implementations ────────────────────────────────

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError> {
            Ok(params.unwrap_or(json!(null)))
        }
    }

    struct ParamCheckHandler;

    #[async_trait]
    impl MethodHandler for ParamCheckHandler {
        async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError> {
            let p = params.ok_or_else(|| RpcError::invalid_params("params required"))?;
            let name = p
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| RpcError::invalid_params("Missing 'name'"))?;
            Ok(json!({ "hello": name }))
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn register_and_invoke() {
        let reg = MethodRegistry::new();
        reg.register("echo", EchoHandler).unwrap();
        let out = reg.invoke("echo", Some(json!({"x": 1}))).await;
        assert_eq!(out.outcome, Ok(json!({"x": 1})));
        assert!(out.fault.is_none());
    }

    #[tokio::test]
    async fn unknown_method() {
        let reg = MethodRegistry::new();
        let out = reg.invoke("nope", None).await;
        let err = out.outcome.unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not found");
        assert!(err.data.is_none());
        assert!(out.fault.is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first() {
        let reg = MethodRegistry::new();
        reg.register("m", EchoHandler).unwrap();
        let err = reg
            .register_fn("m", |_| async { Ok(json!("second")) })
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateMethod("m".into()));
        assert_eq!(reg.invoke("m", Some(json!(1))).await.outcome, Ok(json!(1)));
    }

    #[tokio::test]
    async fn typed_error_via_question_mark() {
        let reg = MethodRegistry::new();
        reg.register("greet", ParamCheckHandler).unwrap();
        let out = reg.invoke("greet", Some(json!({}))).await;
        let err = out.outcome.unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.message, "Missing 'name'");
        assert!(out.fault.is_none());

        let ok = reg.invoke("greet", Some(json!({"name": "x"}))).await;
        assert_eq!(ok.outcome, Ok(json!({"hello": "x"})));
    }

    #[tokio::test]
    async fn closure_handler_sums_params() {
        let reg = MethodRegistry::new();
        reg.register_fn("test.method1", |params| async move {
            let p = params.unwrap_or_default();
            Ok(json!(p[0].as_i64().unwrap_or(0) + p[1].as_i64().unwrap_or(0)))
        })
        .unwrap();
        assert_eq!(
            reg.invoke("test.method1", Some(json!([1, 2]))).await.outcome,
            Ok(json!(3))
        );
    }

    #[tokio::test]
    async fn returned_failure_is_not_escalated() {
        let reg = MethodRegistry::new();
        reg.register_fn("return_error", |_| async {
            Err(anyhow::anyhow!("msg3").into())
        })
        .unwrap();
        let out = reg.invoke("return_error", None).await;
        assert_eq!(out.outcome, Err(RpcError::internal()));
        assert!(out.fault.is_none());
    }

    #[tokio::test]
    async fn panic_is_raised_fault() {
        let reg = MethodRegistry::new();
        async fn boom(_: Option<Value>) -> Result<Value, HandlerError> {
            panic!("msg4")
        }
        reg.register_fn("boom", boom).unwrap();
        let out = reg.invoke("boom", None).await;
        assert_eq!(out.outcome.unwrap_err().code, INTERNAL_ERROR);
        assert_matches!(out.fault, Some(Fault::Panic(ref m)) if m == "msg4");
    }

    #[tokio::test]
    async fn panic_with_rpc_error_keeps_code() {
        let reg = MethodRegistry::new();
        async fn throw_rpc_error(_: Option<Value>) -> Result<Value, HandlerError> {
            std::panic::panic_any(RpcError::new(222, "msg2"))
        }
        reg.register_fn("throw_rpc_error", throw_rpc_error).unwrap();
        let out = reg.invoke("throw_rpc_error", None).await;
        assert_eq!(out.outcome, Err(RpcError::new(222, "msg2")));
        assert_matches!(out.fault, Some(Fault::Rpc(_)));
    }

    #[tokio::test]
    async fn methods_sorted_and_has_method() {
        let reg = MethodRegistry::default();
        reg.register("b", EchoHandler).unwrap();
        reg.register("a", EchoHandler).unwrap();
        assert_eq!(reg.methods(), vec!["a", "b"]);
        assert!(reg.has_method("a"));
        assert!(!reg.has_method("c"));
    }
}
