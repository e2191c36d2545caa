// Loader counters: cache hit rate, downloaded bytes, write faults, live transfers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub downloaded_bytes: u64,
    pub cache_write_failures: u64,
    pub active_transfers: u32,
    pub running_calls: u32,
    pub cache_hit_rate: f64,
}

pub struct StatsCollector {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    downloaded_bytes: AtomicU64,
    cache_write_failures: AtomicU64,
    active_transfers: AtomicU32,
    running_calls: AtomicU32,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            cache_write_failures: AtomicU64::new(0),
            active_transfers: AtomicU32::new(0),
            running_calls: AtomicU32::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transfers(&self) {
        self.active_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_transfers(&self) {
        self.active_transfers.fetch_sub(1, Ordering::Relaxed);
    }

    /// A call task started; paired with [`call_finished`](Self::call_finished).
    pub fn call_started(&self) {
        self.running_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_finished(&self) {
        self.running_calls.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups > 0 {
            cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        StatsSnapshot {
            cache_hits,
            cache_misses,
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            active_transfers: self.active_transfers.load(Ordering::Relaxed),
            running_calls: self.running_calls.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
