//! Order lifecycle states.

use serde::{Deserialize, Serialize};

/// The status of an order in the pipeline.
///
/// State transitions:
/// ```text
/// Received ──► InventoryReserved ──► PaymentAuthorized ──► Confirmed
///    │                │                      │
///    └────────────────┴──────────────────────┴──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Intent accepted and recorded.
    Received,

    /// Inventory is held for the order.
    InventoryReserved,

    /// Payment is authorized for the order.
    PaymentAuthorized,

    /// Order confirmed (terminal state).
    Confirmed,

    /// A step failed and completed steps are being undone.
    Compensating,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Received, InventoryReserved)
                | (InventoryReserved, PaymentAuthorized)
                | (PaymentAuthorized, Confirmed)
                | (Received | InventoryReserved | PaymentAuthorized, Compensating)
                | (Compensating, Failed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Received => "Received",
            OrderStatus::InventoryReserved => "InventoryReserved",
            OrderStatus::PaymentAuthorized => "PaymentAuthorized",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Compensating => "Compensating",
            OrderStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
