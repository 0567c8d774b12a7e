use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};
use parking_lot::Mutex;

/// Spaces out requests to the market-data provider.
///
/// The free FMP tier rejects bursts, so per-symbol lookups wait at least
/// `min_delay` after the previous request started.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<Option<Instant>>>,
    min_delay: Duration,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request: Arc::new(Mutex::new(None)),
            min_delay,
        }
    }

    /// Wait for a permit and for the minimum spacing since the last request.
    /// The permit is released when the returned guard is dropped.
    pub async fn acquire(&self) -> RateLimitGuard {
        // The semaphore is never closed, so acquiring only fails if that changes.
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        let wait_time = {
            let last = self.last_request.lock();
            last.and_then(|at| self.min_delay.checked_sub(at.elapsed()))
        };

        if let Some(delay) = wait_time {
            sleep(delay).await;
        }

        *self.last_request.lock() = Some(Instant::now());

        RateLimitGuard { _permit: permit }
    }
}

pub struct RateLimitGuard {
    _permit: Option<OwnedSemaphorePermit>,
}
