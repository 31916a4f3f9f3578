//! Fixed-delay retry schedule

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ordered list of delays, one per attempt
///
/// Attempt `i` waits `delays[i]` after failing, except the last attempt which
/// gives up immediately. The number of attempts is the list length; an empty
/// list still makes one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryPolicy {
    delays_ms: Vec<u64>,
}

impl RetryPolicy {
    /// Create policy from delays
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays_ms: delays
                .into_iter()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .collect(),
        }
    }

    /// Create policy from millisecond delays
    #[inline]
    #[must_use]
    pub fn from_millis(delays_ms: Vec<u64>) -> Self {
        Self { delays_ms }
    }

    /// Single attempt, no retries
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::from_millis(Vec::new())
    }

    /// Total attempts
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays_ms.len().max(1)
    }

    /// Delay to wait after attempt `attempt` (zero-based) fails, or `None` if
    /// it was the last one
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if attempt + 1 >= self.attempts() {
            return None;
        }
        self.delays_ms.get(attempt).copied().map(Duration::from_millis)
    }

    /// Sum of all waits across a fully failed run
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        (0..self.attempts())
            .filter_map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(vec![500, 1_000, 2_000])
    }
}
