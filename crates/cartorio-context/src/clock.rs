//! Wall-clock source
//!
//! Durations inside the coordination units run on `tokio::time` so tests can
//! pause them. Timestamps that are persisted or shown to users come from a
//! [`Clock`] so they can be pinned in tests as well.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as milliseconds since the Unix epoch
    #[inline]
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Shared, dynamically dispatched clock
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock
    #[inline]
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
