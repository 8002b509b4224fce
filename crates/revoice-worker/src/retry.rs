//! Job-level retry policy with exponential backoff.
//!
//! A failed attempt either schedules retry `n` (sleeping
//! `initial * 2^n`, capped at `max`) or gives up once `max_retries`
//! retries have been used.

use std::time::Duration;

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay, doubled per retry
    pub initial: Duration,
    /// Upper bound on any single delay
    pub max: Duration,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
}

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, set the retry counter to `retry`, re-enqueue.
    Retry { retry: u32, delay: Duration },
    /// Retries exhausted.
    GiveUp,
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Decide the next step for a job that has already been retried `retries` times.
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        let retry = retries + 1;
        RetryDecision::Retry {
            retry,
            delay: self.delay_for_retry(retry),
        }
    }
}
