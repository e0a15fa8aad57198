//! Shared abort state between the async caller and the blocking worker

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const TIMED_OUT: u8 = 1;
const CANCELLED: u8 = 2;

/// Why a sandbox run was stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    TimedOut,
    Cancelled,
}

/// One-shot flag recording the first reason a run was aborted
///
/// The worker polls it between statements and rows; the engine's own
/// interrupt covers the time spent inside a single statement.
#[derive(Debug, Default)]
pub struct AbortFlag {
    state: AtomicU8,
}

impl AbortFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason` unless the run was already aborted; returns whether
    /// this call was the one that tripped the flag
    pub fn trip(&self, reason: AbortReason) -> bool {
        let value = match reason {
            AbortReason::TimedOut => TIMED_OUT,
            AbortReason::Cancelled => CANCELLED,
        };
        self.state
            .compare_exchange(RUNNING, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        match self.state.load(Ordering::Acquire) {
            TIMED_OUT => Some(AbortReason::TimedOut),
            CANCELLED => Some(AbortReason::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.reason().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let flag = AbortFlag::new();
        assert!(!flag.is_tripped());

        assert!(flag.trip(AbortReason::TimedOut));
        assert!(!flag.trip(AbortReason::Cancelled));
        assert_eq!(flag.reason(), Some(AbortReason::TimedOut));
    }
}
