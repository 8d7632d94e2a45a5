//! Composition of bulkhead, circuit breaker, timeout and retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
use crate::error::{CallError, CallErrorKind, RemoteError};
use crate::retry::RetryConfig;

/// Resilience settings for one downstream dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Maximum concurrent in-flight calls.
    pub bulkhead_limit: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(2),
            bulkhead_limit: 25,
        }
    }
}

impl ResilienceConfig {
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bulkhead_limit(mut self, bulkhead_limit: usize) -> Self {
        self.bulkhead_limit = bulkhead_limit;
        self
    }
}

/// Outcome of one resilience-wrapped call.
#[derive(Debug)]
pub struct DownstreamCallResult<T> {
    pub outcome: Result<T, CallError>,
    /// Wall time from admission to final outcome, backoff included.
    pub latency: Duration,
    /// Attempts that actually reached the dependency.
    pub attempts: u32,
}

impl<T> DownstreamCallResult<T> {
    /// Returns true if the call eventually succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the kind of the final failure, if any.
    pub fn error_kind(&self) -> Option<CallErrorKind> {
        self.outcome.as_ref().err().map(CallError::kind)
    }

    /// Discards the call metadata.
    pub fn into_result(self) -> Result<T, CallError> {
        self.outcome
    }
}

/// Per-dependency resilience state and configuration.
///
/// Construct one per dependency and share it (usually behind an `Arc`) with
/// every component calling that dependency, so that they all observe the same
/// circuit and bulkhead.
#[derive(Debug)]
pub struct ResiliencePolicy {
    name: String,
    config: ResilienceConfig,
    breaker: CircuitBreaker,
    bulkhead: Bulkhead,
}

impl ResiliencePolicy {
    /// Creates a policy for the named dependency.
    pub fn new(name: impl Into<String>, config: ResilienceConfig) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), config.circuit_breaker.clone()),
            bulkhead: Bulkhead::new(name.clone(), config.bulkhead_limit),
            name,
            config,
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the policy configuration.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Returns the current circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Returns a snapshot of the circuit breaker.
    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// Returns the bulkhead guarding this dependency.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Calls the dependency using the policy's own retry budget.
    pub async fn call<T, F, Fut>(&self, op: F) -> DownstreamCallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let retry = self.config.retry.clone();
        self.call_with_retry(&retry, op).await
    }

    /// Calls the dependency with an explicit retry budget.
    ///
    /// Bulkhead, circuit breaker and timeout still come from the policy.
    pub async fn call_with_retry<T, F, Fut>(
        &self,
        retry: &RetryConfig,
        mut op: F,
    ) -> DownstreamCallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let started = Instant::now();
        let mut attempts = 0;
        let outcome = self.execute(retry, &mut op, &mut attempts).await;
        let latency = started.elapsed();

        let label = match &outcome {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(
            "downstream_calls_total",
            "dependency" => self.name.clone(),
            "outcome" => label
        )
        .increment(1);
        metrics::histogram!("downstream_call_duration_seconds", "dependency" => self.name.clone())
            .record(latency.as_secs_f64());

        DownstreamCallResult {
            outcome,
            latency,
            attempts,
        }
    }

    async fn execute<T, F, Fut>(
        &self,
        retry: &RetryConfig,
        op: &mut F,
        attempts: &mut u32,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _slot = self.bulkhead.try_enter()?;

        loop {
            // Re-checked before every attempt: an Open circuit ends the retry loop.
            let permit = self.breaker.try_acquire()?;
            *attempts += 1;

            let error = match tokio::time::timeout(self.config.timeout, op()).await {
                Ok(Ok(value)) => {
                    permit.success();
                    return Ok(value);
                }
                Ok(Err(remote)) => {
                    // A business rejection is a healthy answer from the dependency.
                    if remote.is_transient() {
                        permit.failure();
                    } else {
                        permit.success();
                    }
                    CallError::Remote {
                        dependency: self.name.clone(),
                        error: remote,
                    }
                }
                Err(_) => {
                    permit.failure();
                    CallError::Timeout {
                        dependency: self.name.clone(),
                        after: self.config.timeout,
                    }
                }
            };

            if !error.is_transient() || *attempts >= retry.attempts() {
                return Err(error);
            }

            let delay = retry.backoff_for(*attempts);
            debug!(
                dependency = %self.name,
                attempt = *attempts,
                ?delay,
                error = %error,
                "retrying downstream call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(config: ResilienceConfig) -> ResiliencePolicy {
        ResiliencePolicy::new("inventory", config)
    }

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::new(attempts, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let p = policy(ResilienceConfig::default());
        let result = p.call(|| async { Ok::<_, RemoteError>(42) }).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.into_result().unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let p = policy(ResilienceConfig::default().with_retry(fast_retry(3)));
        let calls = Arc::new(AtomicU32::new(0));

        let result = p
            .call(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RemoteError::unavailable("503"))
                    } else {
                        Ok("reserved")
                    }
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms + 20ms of backoff
        assert!(result.latency >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_rejection_is_not_retried() {
        let p = policy(ResilienceConfig::default().with_retry(fast_retry(5)));
        let calls = Arc::new(AtomicU32::new(0));

        let result = p
            .call(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RemoteError::rejected("insufficient stock"))
                }
            })
            .await;

        assert_eq!(result.error_kind(), Some(CallErrorKind::RemoteError));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let p = policy(
            ResilienceConfig::default()
                .with_timeout(Duration::from_millis(50))
                .with_retry(RetryConfig::no_retry()),
        );

        let result = p
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, RemoteError>(())
            })
            .await;

        assert_eq!(result.error_kind(), Some(CallErrorKind::Timeout));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_when_circuit_opens() {
        let p = policy(
            ResilienceConfig::default()
                .with_circuit_breaker(CircuitBreakerConfig::consecutive_failures(
                    2,
                    Duration::from_secs(30),
                ))
                .with_retry(fast_retry(5)),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let result = p
            .call(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RemoteError::unavailable("503"))
                }
            })
            .await;

        assert_eq!(result.error_kind(), Some(CallErrorKind::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.attempts, 2);
        assert_eq!(p.circuit_state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulkhead_rejects_concurrent_overflow() {
        let p = Arc::new(policy(ResilienceConfig::default().with_bulkhead_limit(1)));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

        let holder = {
            let p = p.clone();
            let release_rx = release_rx.clone();
            tokio::spawn(async move {
                p.call(|| {
                    let release_rx = release_rx.clone();
                    async move {
                        if let Some(rx) = release_rx.lock().await.take() {
                            let _ = rx.await;
                        }
                        Ok::<_, RemoteError>(())
                    }
                })
                .await
            })
        };

        // Let the first call take the only slot.
        tokio::task::yield_now().await;
        while p.bulkhead().in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let rejected = p.call(|| async { Ok::<_, RemoteError>(()) }).await;
        assert_eq!(rejected.error_kind(), Some(CallErrorKind::BulkheadRejected));
        assert_eq!(rejected.attempts, 0);

        release_tx.send(()).unwrap();
        assert!(holder.await.unwrap().is_success());
        assert_eq!(p.bulkhead().in_flight(), 0);
    }
}
