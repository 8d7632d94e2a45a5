//! Count-based circuit breaker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::CallError;

/// Circuit breaker states.
///
/// State transitions:
/// ```text
/// Closed ──(failure rate ≥ threshold)──► Open ──(cool-down)──► HalfOpen
///   ▲                                     ▲                       │
///   └──────────(trials healthy)───────────┼───────────────────────┤
///                                         └──(trials unhealthy)───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CircuitState {
    /// Calls flow normally; outcomes are recorded in the rolling window.
    #[default]
    Closed,
    /// Calls are rejected without contacting the dependency.
    Open,
    /// A limited number of trial calls probe the dependency.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0..=1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes kept in the rolling window.
    pub sliding_window_size: usize,
    /// Outcomes required in the window before the failure ratio is evaluated.
    pub minimum_calls: usize,
    /// Time spent Open before trial calls are let through.
    pub cool_down: Duration,
    /// Number of trial calls admitted while HalfOpen.
    pub half_open_trial_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            minimum_calls: 5,
            cool_down: Duration::from_secs(30),
            half_open_trial_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// A breaker that opens after `failures` consecutive failed calls.
    pub fn consecutive_failures(failures: usize, cool_down: Duration) -> Self {
        let failures = failures.max(1);
        Self {
            failure_rate_threshold: 1.0,
            sliding_window_size: failures,
            minimum_calls: failures,
            cool_down,
            half_open_trial_calls: 1,
        }
    }

    fn effective_minimum_calls(&self) -> usize {
        self.minimum_calls.clamp(1, self.sliding_window_size.max(1))
    }
}

/// Point-in-time view of a breaker, for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    /// Outcomes currently buffered in the rolling window.
    pub buffered_calls: usize,
    /// Failed outcomes currently buffered in the rolling window.
    pub failed_calls: usize,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition; permits from an older generation are ignored.
    generation: u64,
    /// `true` marks a failed outcome.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trials_issued: usize,
    trial_successes: usize,
    trial_failures: usize,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            window: VecDeque::new(),
            opened_at: None,
            trials_issued: 0,
            trial_successes: 0,
            trial_failures: 0,
        }
    }

    fn failed_calls(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }
}

/// Circuit breaker guarding one downstream dependency.
///
/// Shared by every in-flight call to that dependency. All mutation happens
/// under a short, synchronous lock that is never held across an `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Returns the name of the guarded dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state.
    ///
    /// An Open circuit whose cool-down has elapsed still reports Open until
    /// the next call moves it to HalfOpen.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns a snapshot of the breaker for reporting.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            buffered_calls: inner.window.len(),
            failed_calls: inner.failed_calls(),
        }
    }

    /// Asks permission to issue one call.
    ///
    /// Fails with [`CallError::CircuitOpen`] while Open (and cooling down) or
    /// when every HalfOpen trial slot is taken.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CallError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .opened_at
                .is_none_or(|opened_at| opened_at.elapsed() >= self.config.cool_down);
            if !cooled_down {
                return Err(self.open_error());
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        match inner.state {
            CircuitState::Closed => Ok(CircuitPermit::new(self, inner.generation, false)),
            CircuitState::HalfOpen => {
                if inner.trials_issued >= self.config.half_open_trial_calls.max(1) {
                    return Err(self.open_error());
                }
                inner.trials_issued += 1;
                Ok(CircuitPermit::new(self, inner.generation, true))
            }
            CircuitState::Open => Err(self.open_error()),
        }
    }

    fn on_outcome(&self, generation: u64, failed: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.sliding_window_size.max(1) {
                    inner.window.pop_front();
                }

                let buffered = inner.window.len();
                if buffered >= self.config.effective_minimum_calls() {
                    let failure_rate = inner.failed_calls() as f64 / buffered as f64;
                    if failure_rate >= self.config.failure_rate_threshold {
                        warn!(
                            dependency = %self.name,
                            failure_rate,
                            buffered,
                            "failure rate threshold reached"
                        );
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen => {
                if failed {
                    inner.trial_failures += 1;
                } else {
                    inner.trial_successes += 1;
                }

                let reported = inner.trial_successes + inner.trial_failures;
                if reported >= self.config.half_open_trial_calls.max(1) {
                    let failure_rate = inner.trial_failures as f64 / reported as f64;
                    if failure_rate >= self.config.failure_rate_threshold {
                        self.transition(&mut inner, CircuitState::Open);
                    } else {
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_abandoned_trial(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.trials_issued = inner.trials_issued.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.window.clear();
        inner.trials_issued = 0;
        inner.trial_successes = 0;
        inner.trial_failures = 0;
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);

        metrics::counter!(
            "circuit_transitions_total",
            "dependency" => self.name.clone(),
            "state" => to.as_str()
        )
        .increment(1);

        match to {
            CircuitState::Open => warn!(dependency = %self.name, %from, "circuit opened"),
            _ => info!(dependency = %self.name, %from, %to, "circuit state changed"),
        }
    }

    fn open_error(&self) -> CallError {
        CallError::CircuitOpen {
            dependency: self.name.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission to issue one call, handed out by [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). Dropping an unreported HalfOpen permit frees its
/// trial slot without counting an outcome.
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    reported: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, trial: bool) -> Self {
        Self {
            breaker,
            generation,
            trial,
            reported: false,
        }
    }

    /// Records a healthy outcome.
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, false);
    }

    /// Records a failed outcome.
    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, true);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.reported {
            self.breaker.on_abandoned_trial(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            "inventory",
            CircuitBreakerConfig::consecutive_failures(failures, Duration::from_secs(10)),
        )
    }

    fn fail(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().failure();
    }

    fn succeed(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().success();
    }

    #[test]
    fn test_starts_closed() {
        let b = breaker(3);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().buffered_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_consecutive_failures() {
        let b = breaker(3);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);

        let err = b.try_acquire().unwrap_err();
        assert!(matches!(err, CallError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_breaks_the_failure_streak() {
        let b = breaker(3);
        fail(&b);
        fail(&b);
        succeed(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_threshold_over_window() {
        let b = CircuitBreaker::new(
            "payment",
            CircuitBreakerConfig {
                failure_rate_threshold: 0.5,
                sliding_window_size: 4,
                minimum_calls: 4,
                cool_down: Duration::from_secs(1),
                half_open_trial_calls: 1,
            },
        );
        succeed(&b);
        fail(&b);
        succeed(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cool_down_and_close_on_success() {
        let b = breaker(2);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(b.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = b.try_acquire().unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);

        // Only one trial slot is configured.
        assert!(b.try_acquire().is_err());

        trial.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let b = breaker(1);
        fail(&b);
        tokio::time::advance(Duration::from_secs(10)).await;

        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let b = breaker(1);
        fail(&b);
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = b.try_acquire().unwrap();
        drop(trial);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_permit_is_ignored() {
        let b = breaker(1);
        let stale = b.try_acquire().unwrap();
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);

        // Reported after the transition: must not affect the Open circuit.
        stale.success();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_minimum_calls_clamped_to_window() {
        let config = CircuitBreakerConfig {
            minimum_calls: 50,
            sliding_window_size: 4,
            ..CircuitBreakerConfig::default()
        };
        assert_eq!(config.effective_minimum_calls(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(CircuitState::Closed.to_string(), "Closed");
        assert_eq!(CircuitState::Open.to_string(), "Open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HalfOpen");
    }
}
