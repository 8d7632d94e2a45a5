//! Resilience policies for calls to downstream dependencies.
//!
//! Each dependency gets its own [`ResiliencePolicy`], built from an explicit
//! [`ResilienceConfig`] and shared (behind an `Arc`) by every caller of that
//! dependency. A call through the policy composes four controls:
//!
//! 1. Bulkhead admission (limits concurrent in-flight calls)
//! 2. Circuit breaker check (fails fast while the dependency is unhealthy)
//! 3. One attempt bounded by a timeout
//! 4. Retry with exponential backoff for transient failures only
//!
//! [`RateLimiter`] is a separate per-key admission control used at the
//! pipeline entry.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod error;
pub mod policy;
pub mod rate_limiter;
pub mod retry;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use error::{CallError, CallErrorKind, RemoteError};
pub use policy::{DownstreamCallResult, ResilienceConfig, ResiliencePolicy};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::RetryConfig;
