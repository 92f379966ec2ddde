//! Global request throttling for polite fetching.
//!
//! A single [`RateLimiter`] is shared by every fetch worker in a run. It
//! spaces grants by at least `1 / qps` seconds no matter how many workers
//! are waiting, so the worker count controls parallelism while the limiter
//! alone controls the request rate seen by the target site.
//!
//! # Example
//!
//! ```rust,no_run
//! use gleaner_core::throttle::RateLimiter;
//!
//! # async fn run() -> Result<(), gleaner_core::AppError> {
//! let limiter = RateLimiter::from_qps(0.7)?;
//! limiter.acquire().await; // immediate
//! limiter.acquire().await; // ~1.43s later
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AppError;

/// Minimum-interval gate shared across workers.
///
/// Cloning is cheap and every clone shares the same schedule.
#[derive(Clone)]
pub struct RateLimiter {
    interval: Duration,
    /// Earliest instant at which the next grant may be issued.
    next_eligible: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    /// Rates below this are clamped up to it.
    pub const MIN_QPS: f64 = 0.0001;

    /// Create a limiter with an explicit spacing between grants.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_eligible: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Create a limiter allowing at most `qps` grants per second.
    pub fn from_qps(qps: f64) -> Result<Self, AppError> {
        if !qps.is_finite() || qps <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "QPS must be a positive number, got {qps}"
            )));
        }
        let qps = qps.max(Self::MIN_QPS);
        Ok(Self::new(Duration::from_secs_f64(1.0 / qps)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request may be issued.
    ///
    /// The lock is held across the sleep so waiters are released one
    /// interval apart. The schedule advances from the later of "now" and
    /// the previous slot, so an idle period never banks extra grants.
    pub async fn acquire(&self) {
        let mut next = self.next_eligible.lock().await;

        let now = Instant::now();
        if now < *next {
            tracing::debug!(
                wait_ms = %(*next - now).as_millis(),
                "Throttling request"
            );
            tokio::time::sleep_until(*next).await;
        }

        *next = now.max(*next) + self.interval;
    }
}
