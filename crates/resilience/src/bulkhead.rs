//! Semaphore bulkhead limiting concurrent calls to one dependency.

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::CallError;

/// Concurrency limiter for a single dependency.
///
/// Admission never waits: a call that finds every slot taken is rejected
/// immediately with [`CallError::BulkheadRejected`].
#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    limit: usize,
    semaphore: Semaphore,
}

impl Bulkhead {
    /// Largest limit a bulkhead can hold.
    pub const MAX_LIMIT: usize = Semaphore::MAX_PERMITS;

    /// Creates a bulkhead admitting at most `limit` concurrent calls.
    ///
    /// Limits above [`Bulkhead::MAX_LIMIT`] are clamped to it.
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        let limit = limit.min(Self::MAX_LIMIT);
        Self {
            name: name.into(),
            limit,
            semaphore: Semaphore::new(limit),
        }
    }

    /// Returns the configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Takes a slot for the duration of one call (retries included).
    pub fn try_enter(&self) -> Result<SemaphorePermit<'_>, CallError> {
        self.semaphore.try_acquire().map_err(|_| {
            metrics::counter!("bulkhead_rejections_total", "dependency" => self.name.clone())
                .increment(1);
            tracing::warn!(dependency = %self.name, limit = self.limit, "bulkhead full");
            CallError::BulkheadRejected {
                dependency: self.name.clone(),
                limit: self.limit,
            }
        })
    }
}
