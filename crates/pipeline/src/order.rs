//! The recorded lifecycle of one order.

use chrono::{DateTime, Utc};
use common::OrderId;
use order_store::OrderRecord;
use resilience::CallError;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PipelineError};
use crate::intent::OrderIntent;
use crate::services::{Authorization, Reservation};
use crate::status::OrderStatus;

/// One entry of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The failure that moved an order into compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Step that failed, e.g. `payment.authorize`.
    pub step: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Attempts issued to the dependency before giving up.
    pub attempts: u32,
}

impl FailureRecord {
    pub fn new(step: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            kind,
            message: message.into(),
            attempts: 0,
        }
    }

    /// Builds the record for a failed downstream call.
    pub fn from_call(step: impl Into<String>, error: &CallError, attempts: u32) -> Self {
        Self {
            step: step.into(),
            kind: error.kind().into(),
            message: error.to_string(),
            attempts,
        }
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.step, self.kind, self.message)
    }
}

/// Result of one compensating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    /// Compensating action, e.g. `inventory.release`.
    pub action: String,
    /// What the action undid, e.g. `SKU1,2`.
    pub target: String,
    pub attempts: u32,
    /// Failure message when the action did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompensationRecord {
    pub fn succeeded(action: impl Into<String>, target: impl Into<String>, attempts: u32) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            attempts,
            error: None,
        }
    }

    pub fn failed(
        action: impl Into<String>,
        target: impl Into<String>,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            attempts,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `CompensationFailed` for failed actions.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|_| ErrorKind::CompensationFailed)
    }
}

impl std::fmt::Display for CompensationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(f, "{}({}) = success", self.action, self.target),
            Some(error) => write!(f, "{}({}) = failed: {}", self.action, self.target, error),
        }
    }
}

/// Mutable state of an order, owned by the task processing it.
///
/// Status changes go through [`OrderState::transition`], which only allows
/// the moves of the order lifecycle and appends to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    intent: OrderIntent,
    status: OrderStatus,
    transitions: Vec<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reservation: Option<Reservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization: Option<Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureRecord>,
    #[serde(default)]
    compensations: Vec<CompensationRecord>,
}

impl OrderState {
    /// Creates the `Received` state for an accepted intent.
    pub fn new(intent: OrderIntent) -> Self {
        Self {
            intent,
            status: OrderStatus::Received,
            transitions: vec![Transition {
                status: OrderStatus::Received,
                at: Utc::now(),
                note: None,
            }],
            reservation: None,
            authorization: None,
            failure: None,
            compensations: Vec::new(),
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.intent.order_id
    }

    pub fn intent(&self) -> &OrderIntent {
        &self.intent
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the statuses of the audit log in order.
    pub fn status_log(&self) -> Vec<OrderStatus> {
        self.transitions.iter().map(|t| t.status).collect()
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        self.reservation.as_ref()
    }

    pub fn authorization(&self) -> Option<&Authorization> {
        self.authorization.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    pub fn compensations(&self) -> &[CompensationRecord] {
        &self.compensations
    }

    /// Returns true if any compensating action failed.
    pub fn has_failed_compensation(&self) -> bool {
        self.compensations.iter().any(|c| !c.is_success())
    }

    /// Moves the order to `next`, appending to the audit log.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
    ) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.transitions.push(Transition {
            status: next,
            at: Utc::now(),
            note,
        });
        Ok(())
    }

    pub(crate) fn set_reservation(&mut self, reservation: Reservation) {
        self.reservation = Some(reservation);
    }

    pub(crate) fn set_authorization(&mut self, authorization: Authorization) {
        self.authorization = Some(authorization);
    }

    pub(crate) fn set_failure(&mut self, failure: FailureRecord) {
        self.failure = Some(failure);
    }

    pub(crate) fn push_compensation(&mut self, record: CompensationRecord) {
        self.compensations.push(record);
    }

    /// Converts the state into a storable record.
    pub fn to_record(&self) -> Result<OrderRecord, PipelineError> {
        Ok(OrderRecord::new(
            self.intent.order_id.clone(),
            self.intent.customer_id.clone(),
            self.status.as_str(),
            serde_json::to_value(self)?,
        ))
    }

    /// Restores the state from a stored record.
    pub fn from_record(record: &OrderRecord) -> Result<Self, PipelineError> {
        Ok(serde_json::from_value(record.document.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    fn state() -> OrderState {
        OrderState::new(OrderIntent::new("O1", "C1", Money::from_cents(2000)).with_item("SKU1", 2))
    }

    #[test]
    fn test_new_state_is_received() {
        let state = state();
        assert_eq!(state.status(), OrderStatus::Received);
        assert_eq!(state.status_log(), vec![OrderStatus::Received]);
        assert!(state.failure().is_none());
    }

    #[test]
    fn test_transition_appends_to_log() {
        let mut state = state();
        state
            .transition(OrderStatus::InventoryReserved, None)
            .unwrap();
        state
            .transition(OrderStatus::Compensating, Some("payment failed".into()))
            .unwrap();
        state.transition(OrderStatus::Failed, None).unwrap();

        assert_eq!(
            state.status_log(),
            vec![
                OrderStatus::Received,
                OrderStatus::InventoryReserved,
                OrderStatus::Compensating,
                OrderStatus::Failed,
            ]
        );
        assert_eq!(state.transitions()[2].note.as_deref(), Some("payment failed"));
        assert!(state.transitions().windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn test_invalid_transition_leaves_state_untouched() {
        let mut state = state();
        let err = state.transition(OrderStatus::Confirmed, None).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                from: OrderStatus::Received,
                to: OrderStatus::Confirmed
            }
        ));
        assert_eq!(state.status_log(), vec![OrderStatus::Received]);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut state = state();
        state.transition(OrderStatus::Compensating, None).unwrap();
        state.transition(OrderStatus::Failed, None).unwrap();
        assert!(state.transition(OrderStatus::Compensating, None).is_err());
        assert!(state.transition(OrderStatus::Received, None).is_err());
    }

    #[test]
    fn test_record_round_trip_keeps_everything() {
        let mut state = state();
        state.set_reservation(Reservation {
            reservation_id: "RES-0001".into(),
            items: state.intent().items.clone(),
        });
        state.transition(OrderStatus::InventoryReserved, None).unwrap();
        state.set_failure(FailureRecord::new(
            "payment.authorize",
            ErrorKind::RemoteError,
            "payment rejected: insufficient funds",
        ));
        state.push_compensation(CompensationRecord::failed(
            "inventory.release",
            "SKU1,2",
            3,
            "inventory unavailable: down",
        ));

        let record = state.to_record().unwrap();
        assert_eq!(record.status, "InventoryReserved");
        assert_eq!(record.order_id, OrderId::new("O1"));

        let restored = OrderState::from_record(&record).unwrap();
        assert_eq!(restored, state);
        assert!(restored.has_failed_compensation());
    }

    #[test]
    fn test_compensation_display() {
        let ok = CompensationRecord::succeeded("inventory.release", "SKU1,2", 1);
        assert_eq!(ok.to_string(), "inventory.release(SKU1,2) = success");
        assert_eq!(ok.kind(), None);

        let failed = CompensationRecord::failed("payment.void", "AUTH-0001", 2, "timeout");
        assert_eq!(failed.kind(), Some(ErrorKind::CompensationFailed));
    }
}
