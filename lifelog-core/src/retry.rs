//! Retry with exponential backoff
//!
//! Used by the sync pipeline for transient source and encoder failures.
//! Delays double per attempt up to a ceiling, with a jitter factor so
//! repeated failures do not synchronise against the rate-limited source.

use crate::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Counters for observed retry behaviour.
#[derive(Debug, Default)]
pub struct RetryMetrics {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
}

impl RetryMetrics {
    /// Record one retried operation's final outcome
    pub fn record(&self, succeeded: bool) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if succeeded {
            self.success.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failure.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Operations that needed at least one retry
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Retried operations that eventually succeeded
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::SeqCst)
    }

    /// Retried operations that exhausted their attempts
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::SeqCst)
    }
}

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first failure
    pub max_retries: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Fraction of the delay randomised away from the nominal value
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            max_retries: defaults::SYNC_MAX_RETRIES,
            base_delay: defaults::RETRY_BASE_DELAY,
            max_delay: defaults::RETRY_MAX_DELAY,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Override the retry count
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Disable jitter, for deterministic tests
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Retry policy executing fallible async operations.
#[derive(Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    metrics: RetryMetrics,
}

impl RetryPolicy {
    /// Build a policy from config
    #[must_use]
    pub fn with_config(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: RetryMetrics::default(),
        }
    }

    /// Observed retry counters
    #[must_use]
    pub fn metrics(&self) -> &RetryMetrics {
        &self.metrics
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = exp.min(self.config.max_delay);
        if self.config.jitter_factor > 0.0 {
            let range = delay.as_millis() as f64 * self.config.jitter_factor;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }

    /// Run `operation`, retrying recoverable errors with backoff.
    ///
    /// # Errors
    ///
    /// Returns the final error once a non-recoverable error occurs or the
    /// retry budget is exhausted.
    pub async fn execute<F, T, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        self.metrics.record(true);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_recoverable() || attempt >= self.config.max_retries {
                        if attempt > 0 {
                            self.metrics.record(false);
                        }
                        return Err(error);
                    }
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        code = error.code(),
                        %error,
                        "retrying after recoverable error"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
