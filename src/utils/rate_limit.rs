//! Minimum-interval rate limiting shared by every concurrent caller.
//!
//! Admission is serialized through an async mutex (FIFO under tokio). The
//! holder sleeps until `last_release + interval`, dispatches, and the slot
//! stamps the release instant when it is dropped. A caller dropped while still
//! waiting for admission never received a slot and leaves the stamp alone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep_until, Instant};

/// Spaces out dispatches so that consecutive ones start at least `interval` apart
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_release: Arc<Mutex<Option<Instant>>>,
}

/// Exclusive permission to dispatch one request right now.
///
/// Dropping the slot records the release time and admits the next waiter.
#[derive(Debug)]
pub struct RateLimitSlot {
    last_release: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for RateLimitSlot {
    fn drop(&mut self) {
        *self.last_release = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_release: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until it is safe to dispatch, then hand out the slot
    pub async fn acquire_slot(&self) -> RateLimitSlot {
        let guard = Arc::clone(&self.last_release).lock_owned().await;

        if let Some(last) = *guard {
            let earliest = last + self.interval;
            let now = Instant::now();
            if earliest > now {
                tracing::trace!("Rate limiter waiting {:?}", earliest - now);
                sleep_until(earliest).await;
            }
        }

        RateLimitSlot {
            last_release: guard,
        }
    }

    /// Run `dispatch` inside a slot
    pub async fn throttle<F: Future>(&self, dispatch: F) -> F::Output {
        let _slot = self.acquire_slot().await;
        dispatch.await
    }
}
