//! Retry policy for optimistic updates.
//!
//! # Responsibilities
//! - Bound the number of attempts of a read-compute-write cycle
//! - Space attempts with jittered exponential backoff
//!
//! # Design Decisions
//! - Only version conflicts are retried; every other error is final
//! - Delay doubles per attempt up to `max_delay`, plus up to 10% jitter

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Attempts and delays for conflict retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay before retrying after attempt number `attempt` (1-based):
    /// the base delay doubled per earlier attempt, capped at the maximum,
    /// plus up to 10% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(63);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms);
        let spread = capped / 10;
        let jitter = if spread > 0 {
            rand::thread_rng().gen_range(0..spread)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}
