//! Fixed-window rate limiter keyed by caller.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Number of tracked keys above which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Configuration for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Permits available per key in each refresh period.
    pub limit_for_period: u32,
    /// Length of one window.
    pub refresh_period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 2,
            refresh_period: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

/// Hands out a fixed number of permits per key and period, without waiting.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter configuration.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Takes one permit for `key`. Returns false when the window is exhausted.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();

        if !windows.contains_key(key) && windows.len() >= PRUNE_THRESHOLD {
            let period = self.config.refresh_period;
            windows.retain(|_, w| now.duration_since(w.started) < period);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            used: 0,
        });
        if now.duration_since(window.started) >= self.config.refresh_period {
            *window = Window {
                started: now,
                used: 0,
            };
        }

        if window.used < self.config.limit_for_period {
            window.used += 1;
            true
        } else {
            tracing::debug!(key, limit = self.config.limit_for_period, "rate limit reached");
            false
        }
    }

    /// Returns the permits left for `key` in its current window.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        match self.lock().get(key) {
            Some(w) if now.duration_since(w.started) < self.config.refresh_period => {
                self.config.limit_for_period.saturating_sub(w.used)
            }
            _ => self.config.limit_for_period,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
