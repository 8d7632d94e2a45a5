//! Pipeline error types.

use common::{CustomerId, OrderId};
use order_store::StoreError;
use resilience::CallErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::OrderStatus;

/// Classification of a failure, as recorded in an order's state and outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidIntent,
    Timeout,
    CircuitOpen,
    BulkheadRejected,
    /// The dependency answered with a failure.
    RemoteError,
    CompensationFailed,
    NotFound,
    RateLimited,
    DuplicateOrder,
    /// A transition could not be checkpointed.
    Persistence,
    /// The caller stopped waiting before the order finished.
    Abandoned,
}

impl ErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIntent => "InvalidIntent",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::CircuitOpen => "CircuitOpen",
            ErrorKind::BulkheadRejected => "BulkheadRejected",
            ErrorKind::RemoteError => "RemoteError",
            ErrorKind::CompensationFailed => "CompensationFailed",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::DuplicateOrder => "DuplicateOrder",
            ErrorKind::Persistence => "Persistence",
            ErrorKind::Abandoned => "Abandoned",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<CallErrorKind> for ErrorKind {
    fn from(kind: CallErrorKind) -> Self {
        match kind {
            CallErrorKind::Timeout => ErrorKind::Timeout,
            CallErrorKind::CircuitOpen => ErrorKind::CircuitOpen,
            CallErrorKind::BulkheadRejected => ErrorKind::BulkheadRejected,
            CallErrorKind::RemoteError => ErrorKind::RemoteError,
        }
    }
}

/// Errors returned by pipeline operations.
///
/// Downstream failures are not errors at this level: they end in a `Failed`
/// outcome instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The intent is malformed; nothing was recorded.
    #[error("Invalid order intent: {0}")]
    InvalidIntent(String),

    /// No state is recorded for the order.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with the same ID was already submitted.
    #[error("Order already submitted: {0}")]
    DuplicateOrder(OrderId),

    /// The customer exceeded the order rate limit.
    #[error("Too many orders for customer {0}")]
    RateLimited(CustomerId),

    /// A status change that the order lifecycle does not allow.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The task processing the order ended without an outcome.
    #[error("Order processing interrupted: {0}")]
    Interrupted(OrderId),
}

impl PipelineError {
    /// Returns the error kind for errors that have one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineError::InvalidIntent(_) => Some(ErrorKind::InvalidIntent),
            PipelineError::NotFound(_) => Some(ErrorKind::NotFound),
            PipelineError::DuplicateOrder(_) => Some(ErrorKind::DuplicateOrder),
            PipelineError::RateLimited(_) => Some(ErrorKind::RateLimited),
            PipelineError::Store(_) | PipelineError::Serialization(_) => {
                Some(ErrorKind::Persistence)
            }
            PipelineError::InvalidTransition { .. } | PipelineError::Interrupted(_) => None,
        }
    }
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
