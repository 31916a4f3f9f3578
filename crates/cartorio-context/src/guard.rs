//! One-shot initialization guard

use std::sync::atomic::{AtomicBool, Ordering};

/// Atomic "already initialized" flag
///
/// Two callbacks racing to perform the same initialization (the initial
/// session read and the first auth-change event, for example) both call
/// [`InitGuard::try_begin`]; exactly one of them observes `true`.
#[derive(Debug, Default)]
pub struct InitGuard {
    started: AtomicBool,
}

impl InitGuard {
    /// Create an unset guard
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    /// Claim the guard. Returns `true` only for the first caller since the
    /// last [`reset`](Self::reset).
    #[inline]
    pub fn try_begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the guard has been claimed
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Release the guard so the next `try_begin` succeeds again
    #[inline]
    pub fn reset(&self) {
        self.started.store(false, Ordering::Release);
    }
}
