//! Retry budget and exponential backoff for provider calls.

use std::time::Duration;

use crate::outcome::FailureKind;

/// Exponential backoff: `base * factor^retry`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    /// Apply +/- 50% random jitter. Off by default so delays are reproducible.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    pub const fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            factor: 2.0,
            max,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        let scale = self.factor.powi(retry.min(i32::MAX as u32) as i32);
        let seconds = self.base.as_secs_f64() * scale;
        let capped_seconds = seconds.min(self.max.as_secs_f64());
        let delay = Duration::from_secs_f64(capped_seconds.max(0.0));

        if !self.jitter {
            return delay;
        }

        let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
        let random_offset = fastrand::u64(0..=(jitter_ms * 2));
        let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
        Duration::from_millis(total_ms.max(0) as u64)
    }
}

/// Retry policy applied by [`crate::ProviderClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP statuses treated as transient network failures.
    pub retry_on_status: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_empty: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_empty: true,
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::exponential(base, max),
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Whether a failure of `kind` may be retried under this policy.
    pub fn should_retry(&self, kind: FailureKind) -> bool {
        if !self.enabled || !kind.is_transient() {
            return false;
        }
        match kind {
            FailureKind::Timeout => self.retry_on_timeout,
            FailureKind::EmptyData => self.retry_on_empty,
            _ => true,
        }
    }

    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}
