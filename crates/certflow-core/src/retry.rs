//! Retry policy for per-row side effects.

use std::time::Duration;

/// Exponential backoff policy applied to transient failures.
///
/// Only errors classified as retryable by the caller are retried; auth and
/// client errors fail fast regardless of the policy.
///
/// Retrying repeats the whole side effect. A request that timed out may
/// still have been carried out, so a retried email send can deliver twice.
/// Send handlers therefore retry only when the service refused the request
/// outright (429, quota 403 or 503).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set the attempt budget (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Returns true if another attempt is allowed after `attempts_made`.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before the next attempt, given the failures so far.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.multiplier.powi(failures as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}
