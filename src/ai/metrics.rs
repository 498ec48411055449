//! Gateway Metrics Collection
//!
//! In-memory counters for calls, attempts and short-circuits. Thread-safe for
//! concurrent callers sharing one gateway; nothing is persisted.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = MetricsCollector::new();
//! metrics.record_outcome(&outcome);
//! println!("{}", metrics.snapshot().display());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::types::{CallOutcome, ErrorKind};

// =============================================================================
// Metrics Collector
// =============================================================================

/// Thread-safe counters for gateway calls.
///
/// Uses relaxed atomics; snapshots are not a consistent cut across counters.
pub struct MetricsCollector {
    start_time: Instant,
    calls: AtomicU64,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    mocked: AtomicU64,
    fallbacks: AtomicU64,
    circuit_rejections: AtomicU64,
    cooldown_rejections: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub calls: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub mocked: u64,
    pub fallbacks: u64,
    pub circuit_rejections: u64,
    pub cooldown_rejections: u64,
    pub avg_attempt_latency_ms: f64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            calls: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            mocked: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            circuit_rejections: AtomicU64::new(0),
            cooldown_rejections: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }

    /// Record one finished call
    pub fn record_outcome(&self, outcome: &CallOutcome) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.attempts
            .fetch_add(outcome.attempts.len() as u64, Ordering::Relaxed);

        let latency: u128 = outcome.attempts.iter().map(|a| a.elapsed.as_millis()).sum();
        self.total_latency_ms
            .fetch_add(u64::try_from(latency).unwrap_or(u64::MAX), Ordering::Relaxed);

        let visited = outcome.visited_targets().len() as u64;
        if visited > 1 {
            self.fallbacks.fetch_add(visited - 1, Ordering::Relaxed);
        }

        let result = &outcome.result;
        if result.mocked {
            self.mocked.fetch_add(1, Ordering::Relaxed);
        } else if result.ok {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
            match result.error.as_ref().map(|e| e.kind) {
                Some(ErrorKind::CircuitOpen) => {
                    self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
                }
                Some(ErrorKind::CooldownActive) => {
                    self.cooldown_rejections.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSummary {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency = if attempts > 0 {
            total_latency as f64 / attempts as f64
        } else {
            0.0
        };

        MetricsSummary {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            calls: self.calls.load(Ordering::Relaxed),
            attempts,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            mocked: self.mocked.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            cooldown_rejections: self.cooldown_rejections.load(Ordering::Relaxed),
            avg_attempt_latency_ms: avg_latency,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "Calls: {} (ok: {}, failed: {}, mocked: {})\n\
             Attempts: {} (avg {:.0}ms)\n\
             Fallbacks: {}\n\
             Rejected: {} circuit open, {} cooldown",
            self.calls,
            self.successes,
            self.failures,
            self.mocked,
            self.attempts,
            self.avg_attempt_latency_ms,
            self.fallbacks,
            self.circuit_rejections,
            self.cooldown_rejections
        )
    }
}

// =============================================================================
// Shared Type
// =============================================================================

/// Metrics shared between a gateway and its observers
pub type SharedMetrics = Arc<MetricsCollector>;

// =============================================================================
// Tests
// =============================================================================
