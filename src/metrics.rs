//! Settlement counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct RaffleMetrics {
    start_time: Instant,
    entries: AtomicU64,
    upkeeps_performed: AtomicU64,
    rounds_settled: AtomicU64,
    total_paid_out: AtomicU64,
    rejected_callbacks: AtomicU64,
    faults: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub entries: u64,
    pub upkeeps_performed: u64,
    pub rounds_settled: u64,
    pub total_paid_out: u64,
    pub rejected_callbacks: u64,
    pub faults: u64,
    pub uptime_secs: u64,
}

impl RaffleMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            entries: AtomicU64::new(0),
            upkeeps_performed: AtomicU64::new(0),
            rounds_settled: AtomicU64::new(0),
            total_paid_out: AtomicU64::new(0),
            rejected_callbacks: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn record_entry(&self) {
        self.entries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_upkeep(&self) {
        self.upkeeps_performed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_settlement(&self, payout: u64) {
        self.rounds_settled.fetch_add(1, Ordering::SeqCst);
        self.total_paid_out.fetch_add(payout, Ordering::SeqCst);
    }

    pub fn record_rejected_callback(&self) {
        self.rejected_callbacks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries: self.entries.load(Ordering::SeqCst),
            upkeeps_performed: self.upkeeps_performed.load(Ordering::SeqCst),
            rounds_settled: self.rounds_settled.load(Ordering::SeqCst),
            total_paid_out: self.total_paid_out.load(Ordering::SeqCst),
            rejected_callbacks: self.rejected_callbacks.load(Ordering::SeqCst),
            faults: self.faults.load(Ordering::SeqCst),
            uptime_secs: self.total_runtime().as_secs(),
        }
    }
}

impl Default for RaffleMetrics {
    fn default() -> Self {
        Self::new()
    }
}
