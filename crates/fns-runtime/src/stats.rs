//! Minimal call counters backing `GET /application/stats` (spec §6).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    handled: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
}

#[derive(Serialize)]
pub struct StatsSnapshot {
    pub handled: u64,
    pub failed: u64,
    pub cache_hits: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
