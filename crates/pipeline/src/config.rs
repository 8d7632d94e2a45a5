//! Pipeline configuration.

use std::time::Duration;

use resilience::{RateLimiterConfig, ResilienceConfig, RetryConfig};

/// Explicit configuration for an [`OrderPipeline`](crate::OrderPipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub inventory: ResilienceConfig,
    pub payment: ResilienceConfig,
    /// Retry budget for compensating actions.
    pub compensation_retry: RetryConfig,
    /// Per-customer order rate limit; `None` disables it.
    pub rate_limit: Option<RateLimiterConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inventory: ResilienceConfig::default(),
            payment: ResilienceConfig::default(),
            compensation_retry: RetryConfig {
                max_attempts: 3,
                backoff_base: Duration::from_millis(200),
                max_backoff: Duration::from_secs(2),
            },
            rate_limit: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_inventory(mut self, inventory: ResilienceConfig) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_payment(mut self, payment: ResilienceConfig) -> Self {
        self.payment = payment;
        self
    }

    pub fn with_compensation_retry(mut self, retry: RetryConfig) -> Self {
        self.compensation_retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}
