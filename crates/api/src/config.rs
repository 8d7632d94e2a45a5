//! Application configuration loaded from environment variables.

use std::time::Duration;

use pipeline::PipelineConfig;
use resilience::{
    Bulkhead, CircuitBreakerConfig, RateLimiterConfig, ResilienceConfig, RetryConfig,
};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for one JSON object per event, anything else for text
/// - `DATABASE_URL`: PostgreSQL URL; orders are kept in memory when unset
/// - `RATE_LIMIT_PER_HOUR`: orders per customer and hour; unset or `0` disables
/// - `INVENTORY_*` / `PAYMENT_*`: per-dependency resilience settings, see
///   [`resilience_from_lookup`]
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let rate_limit = parse::<u32>(&lookup, "RATE_LIMIT_PER_HOUR")
            .filter(|limit| *limit > 0)
            .map(|limit| RateLimiterConfig {
                limit_for_period: limit,
                refresh_period: Duration::from_secs(60 * 60),
            });

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            pipeline: PipelineConfig {
                inventory: resilience_from_lookup(&lookup, "INVENTORY"),
                payment: resilience_from_lookup(&lookup, "PAYMENT"),
                rate_limit,
                ..defaults.pipeline
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Reads the resilience settings of one dependency.
///
/// Keys are `{PREFIX}_TIMEOUT_MS`, `{PREFIX}_RETRY_ATTEMPTS`,
/// `{PREFIX}_BACKOFF_BASE_MS`, `{PREFIX}_BULKHEAD_LIMIT`,
/// `{PREFIX}_FAILURE_RATE`, `{PREFIX}_WINDOW_SIZE` and `{PREFIX}_COOL_DOWN_MS`.
pub fn resilience_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
) -> ResilienceConfig {
    let defaults = ResilienceConfig::default();
    let key = |name: &str| format!("{}_{}", prefix, name);
    let millis = |name: &str| parse::<u64>(lookup, &key(name)).map(Duration::from_millis);

    let window = parse::<usize>(lookup, &key("WINDOW_SIZE"))
        .filter(|w| *w > 0)
        .unwrap_or(defaults.circuit_breaker.sliding_window_size);
    let circuit_breaker = CircuitBreakerConfig {
        failure_rate_threshold: parse::<f64>(lookup, &key("FAILURE_RATE"))
            .filter(|rate| *rate > 0.0 && *rate <= 1.0)
            .unwrap_or(defaults.circuit_breaker.failure_rate_threshold),
        sliding_window_size: window,
        minimum_calls: defaults.circuit_breaker.minimum_calls.min(window),
        cool_down: millis("COOL_DOWN_MS").unwrap_or(defaults.circuit_breaker.cool_down),
        ..defaults.circuit_breaker
    };

    let retry = RetryConfig {
        max_attempts: parse(lookup, &key("RETRY_ATTEMPTS")).unwrap_or(defaults.retry.max_attempts),
        backoff_base: millis("BACKOFF_BASE_MS").unwrap_or(defaults.retry.backoff_base),
        ..defaults.retry
    };

    ResilienceConfig {
        circuit_breaker,
        retry,
        timeout: millis("TIMEOUT_MS").unwrap_or(defaults.timeout),
        bulkhead_limit: parse::<usize>(lookup, &key("BULKHEAD_LIMIT"))
            .filter(|l| *l > 0 && *l <= Bulkhead::MAX_LIMIT)
            .unwrap_or(defaults.bulkhead_limit),
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
