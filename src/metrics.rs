//! Rolling query-latency metrics and pipeline counters.
//!
//! Counters are lock-free atomics. The latency window is a short
//! `VecDeque` behind a mutex held only for a push or a copy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

pub struct Metrics {
    window: usize,
    recent: Mutex<VecDeque<f64>>,
    total_queries: AtomicU64,
    reindex_completed: AtomicU64,
    reindex_failed: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    /// Mean over `recent_latencies`, rounded to 2 decimals; 0 with no queries.
    pub avg_latency_ms: f64,
    /// Oldest first.
    pub recent_latencies: Vec<f64>,
    pub reindex_completed: u64,
    pub reindex_failed: u64,
}

impl Metrics {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            recent: Mutex::new(VecDeque::with_capacity(window)),
            total_queries: AtomicU64::new(0),
            reindex_completed: AtomicU64::new(0),
            reindex_failed: AtomicU64::new(0),
        }
    }

    /// Record one completed query.
    pub fn record_query(&self, latency_ms: f64) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == self.window {
            recent.pop_front();
        }
        recent.push_back(latency_ms);
    }

    pub fn record_reindex(&self, ok: bool) {
        let counter = if ok {
            &self.reindex_completed
        } else {
            &self.reindex_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let recent: Vec<f64> = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        let avg = if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        };
        MetricsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            avg_latency_ms: (avg * 100.0).round() / 100.0,
            recent_latencies: recent,
            reindex_completed: self.reindex_completed.load(Ordering::Relaxed),
            reindex_failed: self.reindex_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snap = Metrics::new(20).snapshot();
        assert_eq!(snap.total_queries, 0);
        assert_eq!(snap.avg_latency_ms, 0.0);
        assert!(snap.recent_latencies.is_empty());
    }

    #[test]
    fn test_window_rolls_and_total_keeps_counting() {
        let m = Metrics::new(3);
        for ms in [10.0, 20.0, 30.0, 40.0, 50.0] {
            m.record_query(ms);
        }
        let snap = m.snapshot();
        assert_eq!(snap.total_queries, 5);
        assert_eq!(snap.recent_latencies, vec![30.0, 40.0, 50.0]);
        assert_eq!(snap.avg_latency_ms, 40.0);
    }

    #[test]
    fn test_average_is_rounded() {
        let m = Metrics::new(20);
        m.record_query(1.0);
        m.record_query(1.0);
        m.record_query(2.0);
        assert_eq!(m.snapshot().avg_latency_ms, 1.33);
    }

    #[test]
    fn test_reindex_counters() {
        let m = Metrics::new(20);
        m.record_reindex(true);
        m.record_reindex(true);
        m.record_reindex(false);
        let snap = m.snapshot();
        assert_eq!(snap.reindex_completed, 2);
        assert_eq!(snap.reindex_failed, 1);
    }
}
