//! Run counters
//!
//! Workers and the result sink bump these counters as requests move through the
//! engine; the engine hands a snapshot back to the caller when the run ends.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every worker
#[derive(Debug, Default)]
pub struct EngineStats {
    pub pulled: AtomicU64,
    pub fetched: AtomicU64,
    pub depth_exceeded: AtomicU64,
    pub duplicates: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub parse_failures: AtomicU64,
    pub retries: AtomicU64,
    pub dropped_after_retry: AtomicU64,
    pub panics: AtomicU64,
    pub harvests: AtomicU64,
    pub items: AtomicU64,
}

/// Increments a counter by one
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            pulled: get(&self.pulled),
            fetched: get(&self.fetched),
            depth_exceeded: get(&self.depth_exceeded),
            duplicates: get(&self.duplicates),
            fetch_failures: get(&self.fetch_failures),
            parse_failures: get(&self.parse_failures),
            retries: get(&self.retries),
            dropped_after_retry: get(&self.dropped_after_retry),
            panics: get(&self.panics),
            harvests: get(&self.harvests),
            items: get(&self.items),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests handed to a worker
    pub pulled: u64,

    /// Fetches that returned a usable body
    pub fetched: u64,

    /// Requests dropped for exceeding their task's depth limit
    pub depth_exceeded: u64,

    /// Requests dropped as already visited
    pub duplicates: u64,

    /// Fetch errors and undersized bodies
    pub fetch_failures: u64,

    /// Parse function errors, including unknown rule names
    pub parse_failures: u64,

    /// Requests pushed back for their one retry
    pub retries: u64,

    /// Requests dropped after failing twice
    pub dropped_after_retry: u64,

    /// Worker iterations that panicked
    pub panics: u64,

    /// Parse results received by the sink
    pub harvests: u64,

    /// Items received by the sink
    pub items: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Crawl Statistics ===")?;
        writeln!(f, "  Requests pulled: {}", self.pulled)?;
        writeln!(f, "  Pages fetched: {}", self.fetched)?;
        writeln!(f, "  Items harvested: {} ({} pages)", self.items, self.harvests)?;
        writeln!(f, "  Duplicates skipped: {}", self.duplicates)?;
        writeln!(f, "  Depth exceeded: {}", self.depth_exceeded)?;
        writeln!(
            f,
            "  Failures: {} fetch, {} parse",
            self.fetch_failures, self.parse_failures
        )?;
        writeln!(
            f,
            "  Retries: {} ({} dropped after retry)",
            self.retries, self.dropped_after_retry
        )?;
        write!(f, "  Worker panics: {}", self.panics)
    }
}
