//! Error types for resilience-wrapped calls.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a downstream dependency itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The dependency refused the request on business grounds
    /// (e.g. insufficient stock or funds). Never retried.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The dependency could not serve the request right now. Retried.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Creates a business rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        RemoteError::Rejected(message.into())
    }

    /// Creates a transient unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        RemoteError::Unavailable(message.into())
    }

    /// Returns true if the failure may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }

    /// Returns the message supplied by the dependency.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Rejected(msg) | RemoteError::Unavailable(msg) => msg,
        }
    }
}

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallErrorKind {
    Timeout,
    CircuitOpen,
    BulkheadRejected,
    RemoteError,
}

impl CallErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorKind::Timeout => "Timeout",
            CallErrorKind::CircuitOpen => "CircuitOpen",
            CallErrorKind::BulkheadRejected => "BulkheadRejected",
            CallErrorKind::RemoteError => "RemoteError",
        }
    }
}

impl std::fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors produced by a call through a [`ResiliencePolicy`](crate::ResiliencePolicy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// An attempt exceeded the configured timeout.
    #[error("call to {dependency} timed out after {after:?}")]
    Timeout { dependency: String, after: Duration },

    /// The circuit breaker rejected the call without contacting the dependency.
    #[error("circuit open for {dependency}")]
    CircuitOpen { dependency: String },

    /// The bulkhead had no free slot for the call.
    #[error("bulkhead full for {dependency} (limit {limit})")]
    BulkheadRejected { dependency: String, limit: usize },

    /// The dependency answered with an error.
    #[error("{dependency} {error}")]
    Remote {
        dependency: String,
        #[source]
        error: RemoteError,
    },
}

impl CallError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> CallErrorKind {
        match self {
            CallError::Timeout { .. } => CallErrorKind::Timeout,
            CallError::CircuitOpen { .. } => CallErrorKind::CircuitOpen,
            CallError::BulkheadRejected { .. } => CallErrorKind::BulkheadRejected,
            CallError::Remote { .. } => CallErrorKind::RemoteError,
        }
    }

    /// Returns true if another attempt could succeed.
    ///
    /// Circuit and bulkhead rejections are not transient from the point of
    /// view of a single call: retrying them immediately cannot help.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Timeout { .. } => true,
            CallError::Remote { error, .. } => error.is_transient(),
            CallError::CircuitOpen { .. } | CallError::BulkheadRejected { .. } => false,
        }
    }
}
