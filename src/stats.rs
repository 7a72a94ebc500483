//! Global counters, snapshotted by `get_stats` / cleared by `reset_stats`.

/// A point-in-time snapshot of the cache's monotonic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub pages_evicted: u64,
    pub pages_written_back: u64,
    pub current_pages_used: u64,
}
