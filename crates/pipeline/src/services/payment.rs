//! Payment service trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use resilience::RemoteError;
use serde::{Deserialize, Serialize};

/// A payment hold placed for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// The authorization ID assigned by the payment service.
    pub authorization_id: String,
    pub customer_id: CustomerId,
    pub amount: Money,
}

/// Trait for payment operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Authorizes `amount` for the customer placing an order.
    async fn authorize(
        &self,
        order_id: &OrderId,
        customer_id: &CustomerId,
        amount: Money,
    ) -> Result<Authorization, RemoteError>;

    /// Voids a previously made authorization. Voiding twice is a no-op.
    async fn void(&self, authorization: &Authorization) -> Result<(), RemoteError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    authorizations: HashMap<String, (OrderId, CustomerId, Money)>,
    next_id: u32,
    scripted_authorize_failures: VecDeque<RemoteError>,
    fail_on_authorize: Option<RemoteError>,
    fail_on_void: Option<RemoteError>,
    latency: Duration,
    authorize_calls: u32,
    void_calls: u32,
}

/// In-memory payment service for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every authorize call fail with `error` until cleared with `None`.
    pub fn set_fail_on_authorize(&self, error: Option<RemoteError>) {
        self.lock().fail_on_authorize = error;
    }

    /// Queues a failure for the next authorize call only.
    pub fn fail_next_authorize(&self, error: RemoteError) {
        self.lock().scripted_authorize_failures.push_back(error);
    }

    /// Makes every void call fail with `error` until cleared with `None`.
    pub fn set_fail_on_void(&self, error: Option<RemoteError>) {
        self.lock().fail_on_void = error;
    }

    /// Delays every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Returns the number of active authorizations.
    pub fn authorization_count(&self) -> usize {
        self.lock().authorizations.len()
    }

    /// Returns how many authorize calls reached the service.
    pub fn authorize_calls(&self) -> u32 {
        self.lock().authorize_calls
    }

    /// Returns how many void calls reached the service.
    pub fn void_calls(&self) -> u32 {
        self.lock().void_calls
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn authorize(
        &self,
        order_id: &OrderId,
        customer_id: &CustomerId,
        amount: Money,
    ) -> Result<Authorization, RemoteError> {
        self.lock().authorize_calls += 1;
        self.simulate_latency().await;

        let mut state = self.lock();
        if let Some(error) = state.scripted_authorize_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.fail_on_authorize {
            return Err(error.clone());
        }

        state.next_id += 1;
        let authorization_id = format!("AUTH-{:04}", state.next_id);
        state.authorizations.insert(
            authorization_id.clone(),
            (order_id.clone(), customer_id.clone(), amount),
        );

        Ok(Authorization {
            authorization_id,
            customer_id: customer_id.clone(),
            amount,
        })
    }

    async fn void(&self, authorization: &Authorization) -> Result<(), RemoteError> {
        self.lock().void_calls += 1;
        self.simulate_latency().await;

        let mut state = self.lock();
        if let Some(error) = &state.fail_on_void {
            return Err(error.clone());
        }
        state
            .authorizations
            .remove(&authorization.authorization_id);
        Ok(())
    }
}
