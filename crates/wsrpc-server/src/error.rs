//! Server error types.

/// Errors from method registration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already bound to this name.
    #[error("method '{0}' already registered")]
    DuplicateMethod(String),
}

/// Errors from starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or inspecting the listener failed.
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
    /// `listen()` after `close()`.
    #[error("server is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_method_display() {
        let err = RegistryError::DuplicateMethod("throw_error".into());
        assert_eq!(err.to_string(), "method 'throw_error' already registered");
    }

    #[test]
    fn io_error_from_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: ServerError = io.into();
        assert!(matches!(err, ServerError::Io(_)));
        assert!(err.to_string().contains("in use"));
    }
}
