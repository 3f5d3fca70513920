//! Rolling per-handler statistics.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Lock-free rolling counters for one handler.
#[derive(Debug, Default)]
pub struct HandlerStats {
    requests: AtomicU64,
    errors: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

/// Point-in-time view of a handler's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests executed.
    pub requests: u64,

    /// Requests that ended in an error reply.
    pub errors: u64,

    /// Cumulative handler latency.
    pub total: Duration,

    /// Worst observed latency.
    pub max: Duration,
}

impl StatsSnapshot {
    /// Mean latency over all executed requests.
    pub fn mean(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        self.total / self.requests as u32
    }
}

impl HandlerStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed request.
    pub fn record(&self, elapsed: Duration, ok: bool) {
        let nanos = elapsed.as_nanos() as u64;
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let stats = HandlerStats::new();
        stats.record(Duration::from_millis(10), true);
        stats.record(Duration::from_millis(30), false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.total, Duration::from_millis(40));
        assert_eq!(snapshot.max, Duration::from_millis(30));
        assert_eq!(snapshot.mean(), Duration::from_millis(20));
    }

    #[test]
    fn test_max_keeps_peak() {
        let stats = HandlerStats::new();
        stats.record(Duration::from_millis(50), true);
        stats.record(Duration::from_millis(5), true);
        assert_eq!(stats.snapshot().max, Duration::from_millis(50));
    }

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(HandlerStats::new().snapshot().mean(), Duration::ZERO);
    }
}
