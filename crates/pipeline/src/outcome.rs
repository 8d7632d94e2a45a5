//! Result of a submission.

use common::OrderId;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::order::{CompensationRecord, FailureRecord, OrderState};
use crate::status::OrderStatus;

/// Final result of processing one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderOutcome {
    pub order_id: OrderId,
    /// `Confirmed` or `Failed`.
    pub status: OrderStatus,
    pub failure: Option<FailureRecord>,
    pub compensations: Vec<CompensationRecord>,
    pub state: OrderState,
}

impl OrderOutcome {
    pub(crate) fn from_state(state: OrderState) -> Self {
        Self {
            order_id: state.order_id().clone(),
            status: state.status(),
            failure: state.failure().cloned(),
            compensations: state.compensations().to_vec(),
            state,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == OrderStatus::Confirmed
    }

    /// Kind of the failure that ended the order, if it failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Returns true if a compensating action failed and needs an operator.
    pub fn needs_remediation(&self) -> bool {
        self.compensations.iter().any(|c| !c.is_success())
    }

    /// Returns the statuses of the audit log in order.
    pub fn log(&self) -> Vec<OrderStatus> {
        self.state.status_log()
    }
}
