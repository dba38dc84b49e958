//! Retry-until-done wrapper for upstream calls.
//!
//! Rate limits are waited out for as long as the service keeps sending them;
//! the finite budget lives in the aggregator, which counts playlist visits.
//! Every other error is returned to the caller on first sight.

use std::sync::Arc;
use std::time::Duration;

use crate::upstream::UpstreamError;

/// Backoff used when a rate-limited response carries no usable hint.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Suspends the calling thread. Split out so tests can record waits.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread only; no locks are held by the executor while it waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Clone)]
pub struct RateLimitedExecutor {
    service: &'static str,
    default_backoff: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimitedExecutor {
    pub fn new(service: &'static str, default_backoff: Duration) -> Self {
        Self::with_sleeper(service, default_backoff, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        service: &'static str,
        default_backoff: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            service,
            default_backoff,
            sleeper,
        }
    }

    /// Run `call` until it returns something other than a rate-limit signal.
    pub fn execute<T, F>(&self, mut call: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Result<T, UpstreamError>,
    {
        let mut waits = 0u32;
        loop {
            match call() {
                Err(UpstreamError::RateLimited { retry_after, .. }) => {
                    let wait = retry_after.unwrap_or(self.default_backoff);
                    waits += 1;
                    log::warn!(
                        "Rate limited by {} (wait #{}), retrying in {}s",
                        self.service,
                        waits,
                        wait.as_secs()
                    );
                    self.sleeper.sleep(wait);
                }
                Err(e) => return Err(e),
                Ok(value) => {
                    if waits > 0 {
                        log::debug!("{} call succeeded after {} rate-limit waits", self.service, waits);
                    }
                    return Ok(value);
                }
            }
        }
    }
}
