//! Backoff policies for the two retry tiers
//!
//! A policy only computes delays; the caller decides how to wait (plain
//! `tokio::time::sleep` in backends, cancellable sleeps in the orchestrator).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay_ms: u64 },
    /// `base * 2^(retry - 1)`, capped at `max_ms`
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }

    /// Shortest delay this schedule can produce
    pub fn min_delay(&self) -> Duration {
        self.delay(1)
    }
}

/// Attempt budget plus delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn once(delay: Duration) -> Self {
        Self {
            max_retries: 1,
            backoff: Backoff::fixed(delay),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry `retry`, or `None` once the budget is spent
    pub fn next_delay(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            None
        } else {
            Some(self.backoff.delay(retry))
        }
    }
}
