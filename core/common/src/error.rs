//! Common error types for gitmount.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Top-level error type for gitmount operations.
///
/// `NotFound` is the only variant that callers are expected to recover from
/// locally. Everything else travels up to the filesystem boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Path does not classify, or the referenced ref/commit/entry is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation was invoked on a path whose kind does not allow it.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The repository object store reported corruption or an unreadable object.
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),
}

impl Error {
    /// Whether this is the recoverable "no such entry" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Prefix the message with diagnostic context, keeping the variant.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        match self {
            Error::NotFound(msg) => Error::NotFound(format!("{ctx}: {msg}")),
            Error::InvariantViolation(msg) => Error::InvariantViolation(format!("{ctx}: {msg}")),
            Error::ObjectStore(msg) => Error::ObjectStore(format!("{ctx}: {msg}")),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{ctx}: {e}"))),
            Error::Serialization(msg) => Error::Serialization(format!("{ctx}: {msg}")),
            Error::InvalidInput(msg) => Error::InvalidInput(format!("{ctx}: {msg}")),
            Error::NotPermitted(msg) => Error::NotPermitted(format!("{ctx}: {msg}")),
        }
    }

    /// Recover an owned error from one shared between concurrent waiters.
    pub fn from_shared(err: Arc<Error>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
            Error::NotFound(msg) => Error::NotFound(msg.clone()),
            Error::InvariantViolation(msg) => Error::InvariantViolation(msg.clone()),
            Error::ObjectStore(msg) => Error::ObjectStore(msg.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Serialization(msg) => Error::Serialization(msg.clone()),
            Error::InvalidInput(msg) => Error::InvalidInput(msg.clone()),
            Error::NotPermitted(msg) => Error::NotPermitted(msg.clone()),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_variant() {
        let err = Error::NotFound("ref 'main'".to_string()).context("/branch/main");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: /branch/main: ref 'main'");
    }

    #[test]
    fn test_context_on_io_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        match Error::Io(io).context("open") {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_from_shared_clones_when_still_shared() {
        let shared = Arc::new(Error::ObjectStore("corrupt pack".to_string()));
        let _other = shared.clone();
        let owned = Error::from_shared(shared);
        assert!(matches!(owned, Error::ObjectStore(ref m) if m == "corrupt pack"));
    }

    #[test]
    fn test_from_shared_unwraps_unique() {
        let owned = Error::from_shared(Arc::new(Error::NotFound("x".to_string())));
        assert!(owned.is_not_found());
    }
}
