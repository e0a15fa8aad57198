//! Cache and execution counters

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by [`crate::ExecutionService`]
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// Requests answered from the cache
    hits: AtomicU64,
    /// Requests that found no live cache entry
    misses: AtomicU64,
    /// Sandbox runs started
    executions: AtomicU64,
    /// Requests answered by waiting on another request's execution
    coalesced: AtomicU64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> StatsReport {
        StatsReport {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub hits: u64,
    pub misses: u64,
    pub executions: u64,
    pub coalesced: u64,
}

impl StatsReport {
    /// Fraction of requests served without running the sandbox themselves
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} executions={} coalesced={} hit_rate={:.2}",
            self.hits,
            self.misses,
            self.executions,
            self.coalesced,
            self.hit_rate()
        )
    }
}
