//! Observability counters for the output pipeline.
//!
//! Lock-free counters for connections and autosend activity. Free list
//! statistics live on the pool itself and are folded into snapshots.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::pool::{message_pool, PoolStats};

/// Global metrics instance for the server.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed ordering for counters (eventual visibility is fine for metrics).
const RELAXED: Ordering = Ordering::Relaxed;

/// Collection of all server metrics.
pub struct Metrics {
    // Connection counters
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,

    // Autosend counters
    pub autosend_ticks: AtomicU64,
    pub autosend_stale_ticks: AtomicU64,
    pub messages_flushed: AtomicU64,
    pub bytes_flushed: AtomicU64,
    pub send_failures: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    pub const fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),

            autosend_ticks: AtomicU64::new(0),
            autosend_stale_ticks: AtomicU64::new(0),
            messages_flushed: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    /// Increment a counter.
    #[inline]
    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, RELAXED);
    }

    /// Add to a counter.
    #[inline]
    pub fn add(&self, counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, RELAXED);
    }

    /// Get counter value.
    #[inline]
    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(RELAXED)
    }

    /// Increment active connections.
    #[inline]
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, RELAXED);
        self.connections_active.fetch_add(1, RELAXED);
    }

    /// Decrement active connections.
    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, RELAXED);
    }

    /// Get a snapshot of all metrics for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(RELAXED),
            connections_active: self.connections_active.load(RELAXED),
            autosend_ticks: self.autosend_ticks.load(RELAXED),
            autosend_stale_ticks: self.autosend_stale_ticks.load(RELAXED),
            messages_flushed: self.messages_flushed.load(RELAXED),
            bytes_flushed: self.bytes_flushed.load(RELAXED),
            send_failures: self.send_failures.load(RELAXED),
            pool: message_pool().stats(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub autosend_ticks: u64,
    pub autosend_stale_ticks: u64,
    pub messages_flushed: u64,
    pub bytes_flushed: u64,
    pub send_failures: u64,
    pub pool: PoolStats,
}

impl MetricsSnapshot {
    /// Render as `key:value` lines grouped by section.
    pub fn to_info_string(&self) -> String {
        let mut out = String::with_capacity(512);

        let _ = writeln!(out, "# Connections");
        let _ = writeln!(out, "connections_total:{}", self.connections_total);
        let _ = writeln!(out, "connections_active:{}", self.connections_active);

        let _ = writeln!(out, "# Autosend");
        let _ = writeln!(out, "autosend_ticks:{}", self.autosend_ticks);
        let _ = writeln!(out, "autosend_stale_ticks:{}", self.autosend_stale_ticks);
        let _ = writeln!(out, "messages_flushed:{}", self.messages_flushed);
        let _ = writeln!(out, "bytes_flushed:{}", self.bytes_flushed);
        let _ = writeln!(out, "send_failures:{}", self.send_failures);

        let _ = writeln!(out, "# Pool");
        let _ = writeln!(out, "pool_size:{}", self.pool.size);
        let _ = writeln!(out, "pool_hits:{}", self.pool.hits);
        let _ = writeln!(out, "pool_misses:{}", self.pool.misses);
        let _ = writeln!(out, "pool_returns:{}", self.pool.returns);
        let _ = writeln!(out, "pool_drops:{}", self.pool.drops);
        let _ = writeln!(out, "pool_hit_rate:{:.4}", self.pool.hit_rate());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.inc(&metrics.autosend_ticks);
        metrics.add(&metrics.bytes_flushed, 128);
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        assert_eq!(metrics.get(&metrics.autosend_ticks), 1);
        assert_eq!(metrics.get(&metrics.bytes_flushed), 128);
        assert_eq!(metrics.get(&metrics.connections_total), 2);
        assert_eq!(metrics.get(&metrics.connections_active), 1);
    }

    #[test]
    fn test_info_string_sections() {
        let metrics = Metrics::new();
        metrics.inc(&metrics.send_failures);

        let info = metrics.snapshot().to_info_string();
        assert!(info.contains("# Autosend"));
        assert!(info.contains("send_failures:1"));
        assert!(info.contains("# Pool"));
        assert!(info.contains("pool_hit_rate:"));
    }
}
