//! The order pipeline: reserve, authorize, confirm, compensate on failure.

use std::sync::Arc;

use common::{CustomerId, OrderId};
use order_store::{OrderStore, StoreError};
use resilience::{CircuitSnapshot, DownstreamCallResult, RateLimiter, ResiliencePolicy};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::intent::OrderIntent;
use crate::order::{CompensationRecord, FailureRecord, OrderState};
use crate::outcome::OrderOutcome;
use crate::services::{Authorization, InventoryService, PaymentService, Reservation};
use crate::status::OrderStatus;
use crate::steps;

/// Where the processing task reports back to `submit`.
type Caller = oneshot::Sender<Result<OrderOutcome>>;

/// Resilience policies of the pipeline's dependencies.
///
/// Share one set between pipelines that call the same dependencies so they
/// observe the same circuits and bulkheads.
#[derive(Debug, Clone)]
pub struct Policies {
    pub inventory: Arc<ResiliencePolicy>,
    pub payment: Arc<ResiliencePolicy>,
}

impl Policies {
    /// Builds fresh policies from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            inventory: Arc::new(ResiliencePolicy::new(
                steps::DEPENDENCY_INVENTORY,
                config.inventory.clone(),
            )),
            payment: Arc::new(ResiliencePolicy::new(
                steps::DEPENDENCY_PAYMENT,
                config.payment.clone(),
            )),
        }
    }
}

/// Circuit breaker state of one dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyCircuit {
    pub dependency: String,
    pub snapshot: CircuitSnapshot,
}

/// Drives order intents through inventory reservation, payment
/// authorization and confirmation.
///
/// Each submission is processed on its own task. Every transition is
/// checkpointed through the [`OrderStore`] before the pipeline moves on, and a
/// failing step compensates the steps that already succeeded, newest first.
#[derive(Clone)]
pub struct OrderPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryService>,
    payment: Arc<dyn PaymentService>,
    policies: Policies,
    rate_limiter: Option<RateLimiter>,
    config: PipelineConfig,
}

impl OrderPipeline {
    /// Creates a pipeline with policies built from `config`.
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryService>,
        payment: Arc<dyn PaymentService>,
        config: PipelineConfig,
    ) -> Self {
        let policies = Policies::from_config(&config);
        Self::with_policies(store, inventory, payment, policies, config)
    }

    /// Creates a pipeline that uses existing policies.
    ///
    /// The resilience settings in `config` are ignored in favour of the ones
    /// the policies were built with.
    pub fn with_policies(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryService>,
        payment: Arc<dyn PaymentService>,
        policies: Policies,
        config: PipelineConfig,
    ) -> Self {
        let rate_limiter = config.rate_limit.clone().map(RateLimiter::new);
        Self {
            inner: Arc::new(Inner {
                store,
                inventory,
                payment,
                policies,
                rate_limiter,
                config,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn policies(&self) -> &Policies {
        &self.inner.policies
    }

    /// Submits an order and waits for its outcome.
    ///
    /// Returns an error only when the order is not accepted (invalid,
    /// duplicate, rate-limited, or not recordable). Downstream failures end in
    /// an outcome with status `Failed`.
    ///
    /// A duplicate id is rejected before the customer's rate limit is
    /// charged. The `Received` record is created on the processing task, so
    /// dropping the returned future at any point does not strand the order:
    /// the pipeline finishes the in-flight call, issues no further steps and
    /// compensates.
    #[tracing::instrument(
        skip(self, intent),
        fields(order_id = %intent.order_id, customer_id = %intent.customer_id)
    )]
    pub async fn submit(&self, intent: OrderIntent) -> Result<OrderOutcome> {
        metrics::counter!("pipeline_submissions_total").increment(1);

        if let Err(error) = intent.validate() {
            tracing::warn!(%error, "order intent rejected");
            return Err(error);
        }

        if self.inner.store.load(&intent.order_id).await?.is_some() {
            tracing::warn!("duplicate order id");
            return Err(PipelineError::DuplicateOrder(intent.order_id));
        }

        if let Some(limiter) = &self.inner.rate_limiter
            && !limiter.try_acquire(intent.customer_id.as_str())
        {
            tracing::warn!("order rate limit exceeded");
            return Err(PipelineError::RateLimited(intent.customer_id));
        }

        let state = OrderState::new(intent);
        let order_id = state.order_id().clone();
        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(
            async move {
                let result = match inner.create(&state).await {
                    Ok(()) => Ok(inner.process(state, &tx).await),
                    Err(error) => Err(error),
                };
                // The caller may have left; the store holds the result either way.
                let _ = tx.send(result);
            }
            .in_current_span(),
        );

        rx.await
            .map_err(|_| PipelineError::Interrupted(order_id))
            .and_then(|result| result)
    }

    /// Returns the recorded state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, order_id: &OrderId) -> Result<OrderState> {
        let record = self
            .inner
            .store
            .load(order_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(order_id.clone()))?;
        OrderState::from_record(&record)
    }

    /// Returns the recorded state of every order of a customer.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<OrderState>> {
        self.inner
            .store
            .list_for_customer(customer_id)
            .await?
            .iter()
            .map(OrderState::from_record)
            .collect()
    }

    /// Returns the circuit breaker state of every dependency.
    pub fn circuit_states(&self) -> Vec<DependencyCircuit> {
        [&self.inner.policies.inventory, &self.inner.policies.payment]
            .into_iter()
            .map(|policy| DependencyCircuit {
                dependency: policy.name().to_string(),
                snapshot: policy.circuit_snapshot(),
            })
            .collect()
    }
}

impl Inner {
    /// Records the `Received` state. A concurrent submit of the same id loses
    /// here even if it passed the duplicate check.
    async fn create(&self, state: &OrderState) -> Result<()> {
        match self.store.create(&state.to_record()?).await {
            Ok(()) => {
                tracing::info!("order received");
                Ok(())
            }
            Err(StoreError::AlreadyExists(order_id)) => {
                tracing::warn!("duplicate order id");
                Err(PipelineError::DuplicateOrder(order_id))
            }
            Err(error) => {
                tracing::error!(%error, "failed to record received order");
                Err(error.into())
            }
        }
    }

    async fn process(
        &self,
        mut state: OrderState,
        caller: &Caller,
    ) -> OrderOutcome {
        let started = Instant::now();

        match self.run_steps(&mut state, caller).await {
            Ok(()) => {
                metrics::counter!("pipeline_confirmed_total").increment(1);
                tracing::info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    "order confirmed"
                );
            }
            Err(failure) => {
                let kind = failure.kind;
                self.compensate(&mut state, failure).await;
                metrics::counter!("pipeline_failed_total", "kind" => kind.as_str()).increment(1);
            }
        }

        metrics::histogram!("pipeline_duration_seconds").record(started.elapsed().as_secs_f64());
        OrderOutcome::from_state(state)
    }

    async fn run_steps(
        &self,
        state: &mut OrderState,
        caller: &Caller,
    ) -> std::result::Result<(), FailureRecord> {
        ensure_caller_waiting(caller, steps::STEP_RESERVE_INVENTORY)?;
        self.reserve_inventory(state).await?;

        ensure_caller_waiting(caller, steps::STEP_AUTHORIZE_PAYMENT)?;
        self.authorize_payment(state).await?;

        ensure_caller_waiting(caller, steps::STEP_CONFIRM)?;
        self.checkpoint(state, OrderStatus::Confirmed, steps::STEP_CONFIRM)
            .await
    }

    async fn reserve_inventory(
        &self,
        state: &mut OrderState,
    ) -> std::result::Result<(), FailureRecord> {
        let intent = state.intent().clone();
        let call = self
            .policies
            .inventory
            .call(|| self.inventory.reserve(&intent.order_id, &intent.items))
            .await;

        match call.outcome {
            Ok(reservation) => {
                tracing::info!(
                    reservation_id = %reservation.reservation_id,
                    attempts = call.attempts,
                    "inventory reserved"
                );
                state.set_reservation(reservation);
                self.checkpoint(
                    state,
                    OrderStatus::InventoryReserved,
                    steps::STEP_RESERVE_INVENTORY,
                )
                .await
            }
            Err(error) => Err(FailureRecord::from_call(
                steps::STEP_RESERVE_INVENTORY,
                &error,
                call.attempts,
            )),
        }
    }

    async fn authorize_payment(
        &self,
        state: &mut OrderState,
    ) -> std::result::Result<(), FailureRecord> {
        let intent = state.intent().clone();
        let call = self
            .policies
            .payment
            .call(|| {
                self.payment
                    .authorize(&intent.order_id, &intent.customer_id, intent.amount)
            })
            .await;

        match call.outcome {
            Ok(authorization) => {
                tracing::info!(
                    authorization_id = %authorization.authorization_id,
                    attempts = call.attempts,
                    "payment authorized"
                );
                state.set_authorization(authorization);
                self.checkpoint(
                    state,
                    OrderStatus::PaymentAuthorized,
                    steps::STEP_AUTHORIZE_PAYMENT,
                )
                .await
            }
            Err(error) => Err(FailureRecord::from_call(
                steps::STEP_AUTHORIZE_PAYMENT,
                &error,
                call.attempts,
            )),
        }
    }

    /// Records `next` durably, then adopts it.
    ///
    /// On failure `state` keeps its previous status so compensation sees what
    /// actually happened downstream.
    async fn checkpoint(
        &self,
        state: &mut OrderState,
        next: OrderStatus,
        step: &str,
    ) -> std::result::Result<(), FailureRecord> {
        let mut candidate = state.clone();
        let saved = match candidate.transition(next, None) {
            Ok(()) => self.save(&candidate).await,
            Err(e) => Err(e),
        };

        match saved {
            Ok(()) => {
                *state = candidate;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(status = %next, %error, "failed to checkpoint order");
                Err(FailureRecord::new(
                    step,
                    ErrorKind::Persistence,
                    format!("could not record {}: {}", next, error),
                ))
            }
        }
    }

    async fn compensate(&self, state: &mut OrderState, failure: FailureRecord) {
        tracing::warn!(
            step = %failure.step,
            kind = %failure.kind,
            error = %failure.message,
            "order step failed, compensating"
        );
        let note = failure.to_string();
        state.set_failure(failure);
        self.record_best_effort(state, OrderStatus::Compensating, Some(note))
            .await;

        if let Some(authorization) = state.authorization().cloned() {
            let record = self.void_payment(&authorization).await;
            state.push_compensation(record);
        }
        if let Some(reservation) = state.reservation().cloned() {
            let record = self.release_inventory(&reservation).await;
            state.push_compensation(record);
        }

        let failed = state
            .compensations()
            .iter()
            .filter(|c| !c.is_success())
            .count();
        let note = (failed > 0).then(|| format!("{} compensation(s) failed", failed));
        self.record_best_effort(state, OrderStatus::Failed, note)
            .await;

        tracing::warn!(compensation_failures = failed, "order failed");
    }

    async fn void_payment(&self, authorization: &Authorization) -> CompensationRecord {
        let call = self
            .policies
            .payment
            .call_with_retry(&self.config.compensation_retry, || {
                self.payment.void(authorization)
            })
            .await;
        compensation_record(
            steps::COMPENSATE_VOID_PAYMENT,
            format!("{},{}", authorization.authorization_id, authorization.amount),
            call,
        )
    }

    async fn release_inventory(&self, reservation: &Reservation) -> CompensationRecord {
        let call = self
            .policies
            .inventory
            .call_with_retry(&self.config.compensation_retry, || {
                self.inventory.release(reservation)
            })
            .await;
        compensation_record(
            steps::COMPENSATE_RELEASE_INVENTORY,
            reservation.describe(),
            call,
        )
    }

    /// Applies a compensation-path transition and tries to record it.
    ///
    /// The outcome is returned to the caller even if the store is unavailable.
    async fn record_best_effort(
        &self,
        state: &mut OrderState,
        next: OrderStatus,
        note: Option<String>,
    ) {
        if let Err(error) = state.transition(next, note) {
            tracing::error!(%error, "unexpected order transition");
            return;
        }
        if let Err(error) = self.save(state).await {
            tracing::warn!(status = %next, %error, "failed to record order state");
        }
    }

    async fn save(&self, state: &OrderState) -> Result<()> {
        let record = state.to_record()?;
        self.store.save(&record).await?;
        Ok(())
    }
}

fn ensure_caller_waiting(
    caller: &Caller,
    next_step: &str,
) -> std::result::Result<(), FailureRecord> {
    if caller.is_closed() {
        tracing::warn!(next_step, "submission abandoned by caller");
        return Err(FailureRecord::new(
            next_step,
            ErrorKind::Abandoned,
            "caller stopped waiting for the outcome",
        ));
    }
    Ok(())
}

fn compensation_record(
    action: &'static str,
    target: String,
    call: DownstreamCallResult<()>,
) -> CompensationRecord {
    match call.outcome {
        Ok(()) => {
            tracing::info!(action, %target, attempts = call.attempts, "compensation succeeded");
            CompensationRecord::succeeded(action, target, call.attempts)
        }
        Err(error) => {
            metrics::counter!("compensation_failures_total", "action" => action).increment(1);
            tracing::warn!(
                action,
                %target,
                attempts = call.attempts,
                %error,
                "compensation failed, needs operator remediation"
            );
            CompensationRecord::failed(action, target, call.attempts, error.to_string())
        }
    }
}
