//! Dispatch and upstream counters.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde::Serialize;

/// Counters for dispatch outcomes, keyed latency per exposed `view/tool`.
pub struct ProxyMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    aborted_calls: AtomicU64,
    cached_results: AtomicU64,

    connection_errors: AtomicU64,
    restarts: AtomicU64,

    active_executions: AtomicU64,

    tool_latencies: DashMap<String, LatencyStats>,
}

/// How a dispatched call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Aborted,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            aborted_calls: AtomicU64::new(0),
            cached_results: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            active_executions: AtomicU64::new(0),
            tool_latencies: DashMap::new(),
        }
    }

    pub fn record_call_start(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.active_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_end(&self, view: &str, tool: &str, outcome: CallOutcome, duration_ms: u64) {
        self.active_executions.fetch_sub(1, Ordering::Relaxed);

        let counter = match outcome {
            CallOutcome::Success => &self.successful_calls,
            CallOutcome::Failure => &self.failed_calls,
            CallOutcome::Aborted => &self.aborted_calls,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.tool_latencies
            .entry(format!("{}/{}", view, tool))
            .or_insert_with(LatencyStats::new)
            .record(duration_ms);
    }

    pub fn record_cached_result(&self) {
        self.cached_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            aborted_calls: self.aborted_calls.load(Ordering::Relaxed),
            cached_results: self.cached_results.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            active_executions: self.active_executions.load(Ordering::Relaxed),
            tool_latency: self
                .tool_latencies
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().snapshot()))
                .collect(),
        }
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);

        LatencySnapshot {
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub aborted_calls: u64,
    pub cached_results: u64,
    pub connection_errors: u64,
    pub restarts: u64,
    pub active_executions: u64,
    /// Keyed by `view/tool`.
    pub tool_latency: BTreeMap<String, LatencySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}
