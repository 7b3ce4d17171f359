//! Cache activity counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::time::zero_to_none;

/// Counters updated by the cache and its writer thread.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub memory_hits: AtomicU64,
    pub storage_loads: AtomicU64,
    pub load_failures: AtomicU64,
    pub saves_requested: AtomicU64,
    pub saves_coalesced: AtomicU64,
    pub saves_completed: AtomicU64,
    pub save_failures: AtomicU64,
    pub last_saved_at: AtomicU64,
    pub last_save_bytes: AtomicU64,
}

impl CacheStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_save(&self, saved_at: u64, bytes: usize) {
        self.saves_completed.fetch_add(1, Ordering::Relaxed);
        self.last_saved_at.store(saved_at, Ordering::Relaxed);
        self.last_save_bytes.store(bytes as u64, Ordering::Relaxed);
    }

    /// Takes a snapshot of the counter values.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            storage_loads: self.storage_loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            saves_requested: self.saves_requested.load(Ordering::Relaxed),
            saves_coalesced: self.saves_coalesced.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
            last_saved_at: zero_to_none(self.last_saved_at.load(Ordering::Relaxed)),
            last_save_bytes: zero_to_none(self.last_save_bytes.load(Ordering::Relaxed)),
        }
    }
}

/// A snapshot of cache counters.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub storage_loads: u64,
    pub load_failures: u64,
    pub saves_requested: u64,
    pub saves_coalesced: u64,
    pub saves_completed: u64,
    pub save_failures: u64,
    pub last_saved_at: Option<u64>,
    pub last_save_bytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_empty() {
        assert_eq!(CacheStats::default().snapshot(), CacheStatsSnapshot::default());
    }

    #[test]
    fn record_save_sets_last_fields() {
        let stats = CacheStats::default();
        CacheStats::bump(&stats.saves_requested);
        stats.record_save(42, 128);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.saves_requested, 1);
        assert_eq!(snapshot.saves_completed, 1);
        assert_eq!(snapshot.last_saved_at, Some(42));
        assert_eq!(snapshot.last_save_bytes, Some(128));
    }
}
