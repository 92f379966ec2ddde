use std::time::Duration;

use crate::error::AppError;

/// Per-job retry policy with exponential backoff.
///
/// Delay schedule with the defaults: 0.8s, 1.44s, 2.59s, ...
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per job, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub growth_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(800),
            growth_factor: 1.8,
        }
    }
}

impl RetryConfig {
    /// Upper bound accepted by [`PipelineConfig::validate`].
    pub const MAX_ATTEMPTS: u32 = 20;
    /// Ceiling for a single backoff sleep.
    pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

    /// Delay to sleep after the given failed attempt (1-indexed).
    ///
    /// - Attempt 1: `base_delay`
    /// - Attempt n: `base_delay * growth_factor^(n-1)`, capped at [`Self::MAX_BACKOFF`]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(Self::MAX_BACKOFF, |delay| delay.min(Self::MAX_BACKOFF))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, growth_factor: f64) -> Self {
        self.base_delay = base_delay;
        self.growth_factor = growth_factor;
        self
    }
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Requested number of fetch workers; clamped to `1..=MAX_WORKERS`.
    pub workers: usize,
    /// Global request ceiling shared by all workers.
    pub qps: f64,
    /// Successful records buffered before one atomic store write.
    pub batch_size: usize,
    /// Emit a progress line every this many completions.
    pub progress_every: usize,
    /// Bound for navigation and each readiness wait.
    pub page_timeout: Duration,
    /// Job queue capacity; defaults to the number of jobs.
    pub queue_capacity: Option<usize>,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            qps: 0.7,
            batch_size: 100,
            progress_every: 50,
            page_timeout: Duration::from_secs(25),
            queue_capacity: None,
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub const MAX_WORKERS: usize = 12;

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_qps(mut self, qps: f64) -> Self {
        self.qps = qps;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, Self::MAX_WORKERS)
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Reject values that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "QPS must be a positive number, got {}",
                self.qps
            )));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > RetryConfig::MAX_ATTEMPTS {
            return Err(AppError::ConfigError(format!(
                "Retry attempts must be between 1 and {}, got {}",
                RetryConfig::MAX_ATTEMPTS,
                self.retry.max_attempts
            )));
        }
        if !self.retry.growth_factor.is_finite() || self.retry.growth_factor < 1.0 {
            return Err(AppError::ConfigError(format!(
                "Backoff growth factor must be >= 1.0, got {}",
                self.retry.growth_factor
            )));
        }
        if self.page_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "Page timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
