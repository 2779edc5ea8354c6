//! Metrics collection for system monitoring
//!
//! Lock-free metrics counters using atomic operations.
//! Updated from the ingest path, exported via API.

use crate::hot_path::IngestOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// System metrics collector
///
/// Thread-safe counters updated from supervisor sessions and the alert
/// loop. Snapshots taken for API export.
pub struct MetricsCollector {
    /// Raw updates received (stream ticks, poll results, secondary quotes)
    ticks_received: AtomicU64,
    ticks_accepted: AtomicU64,
    /// Same price as stored; freshness refreshed only
    ticks_unchanged: AtomicU64,
    /// Failed validation or strict parsing
    ticks_rejected: AtomicU64,
    ticks_unmapped: AtomicU64,
    stream_connects: AtomicU64,
    stream_failures: AtomicU64,
    /// Streaming -> polling transitions
    failovers: AtomicU64,
    /// Polling -> streaming transitions via probe
    stream_restorations: AtomicU64,
    poll_cycles: AtomicU64,
    /// Poll cycles with zero successes
    poll_empty_cycles: AtomicU64,
    secondary_fetches: AtomicU64,
    alerts_fired: AtomicU64,
    delivery_failures: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot for API export
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub ticks_received: u64,
    pub ticks_accepted: u64,
    pub ticks_unchanged: u64,
    pub ticks_rejected: u64,
    pub ticks_unmapped: u64,
    pub stream_connects: u64,
    pub stream_failures: u64,
    pub failovers: u64,
    pub stream_restorations: u64,
    pub poll_cycles: u64,
    pub poll_empty_cycles: u64,
    pub secondary_fetches: u64,
    pub alerts_fired: u64,
    pub delivery_failures: u64,
    pub tick_rate: f64, // ticks per second
    pub uptime_seconds: u64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MetricsCollector {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            ticks_received: AtomicU64::new(0),
            ticks_accepted: AtomicU64::new(0),
            ticks_unchanged: AtomicU64::new(0),
            ticks_rejected: AtomicU64::new(0),
            ticks_unmapped: AtomicU64::new(0),
            stream_connects: AtomicU64::new(0),
            stream_failures: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
            stream_restorations: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            poll_empty_cycles: AtomicU64::new(0),
            secondary_fetches: AtomicU64::new(0),
            alerts_fired: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one normalized update
    #[inline]
    pub fn record_ingest(&self, outcome: IngestOutcome) {
        bump(&self.ticks_received);
        match outcome {
            IngestOutcome::Accepted => bump(&self.ticks_accepted),
            IngestOutcome::Unchanged => bump(&self.ticks_unchanged),
            IngestOutcome::Rejected(_) => bump(&self.ticks_rejected),
            IngestOutcome::Unmapped => bump(&self.ticks_unmapped),
        }
    }

    /// Ticker frame that failed strict parsing
    #[inline]
    pub fn record_malformed(&self) {
        bump(&self.ticks_received);
        bump(&self.ticks_rejected);
    }

    pub fn record_stream_connect(&self) {
        bump(&self.stream_connects);
    }

    pub fn record_stream_failure(&self) {
        bump(&self.stream_failures);
    }

    pub fn record_failover(&self) {
        bump(&self.failovers);
    }

    pub fn record_stream_restored(&self) {
        bump(&self.stream_restorations);
    }

    pub fn record_poll_cycle(&self, successes: usize) {
        bump(&self.poll_cycles);
        if successes == 0 {
            bump(&self.poll_empty_cycles);
        }
    }

    pub fn record_secondary_fetch(&self) {
        bump(&self.secondary_fetches);
    }

    pub fn record_alert_fired(&self) {
        bump(&self.alerts_fired);
    }

    pub fn record_delivery_failure(&self) {
        bump(&self.delivery_failures);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let received = load(&self.ticks_received);

        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            received as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            ticks_received: received,
            ticks_accepted: load(&self.ticks_accepted),
            ticks_unchanged: load(&self.ticks_unchanged),
            ticks_rejected: load(&self.ticks_rejected),
            ticks_unmapped: load(&self.ticks_unmapped),
            stream_connects: load(&self.stream_connects),
            stream_failures: load(&self.stream_failures),
            failovers: load(&self.failovers),
            stream_restorations: load(&self.stream_restorations),
            poll_cycles: load(&self.poll_cycles),
            poll_empty_cycles: load(&self.poll_empty_cycles),
            secondary_fetches: load(&self.secondary_fetches),
            alerts_fired: load(&self.alerts_fired),
            delivery_failures: load(&self.delivery_failures),
            tick_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
