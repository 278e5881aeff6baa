//! In-memory analysis cache
//!
//! Analyses are pure functions of the payload and request, so a finished
//! [`RiderAnalysis`] can be shared between callers until its TTL runs out or
//! the rider's data changes. The cache is injected where it is needed; there
//! is no process-wide instance.

use chrono::NaiveDate;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::analysis::RiderAnalysis;
use crate::config::CacheSettings;
use crate::models::{EventType, WindowFilter};

/// Everything an analysis result depends on besides the payload itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub rider_id: String,
    pub event_type: Option<EventType>,
    pub window: WindowFilter,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    analysis: Arc<RiderAnalysis>,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Entries dropped for age, for capacity or by invalidation
    pub evictions: u64,
}

impl CacheMetrics {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.total_lookups as f64) * 100.0
    }
}

/// Thread-safe LRU cache of rider analyses with a TTL
#[derive(Debug)]
pub struct AnalysisCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    metrics: Mutex<CacheMetrics>,
}

impl AnalysisCache {
    /// Capacity used when zero entries are requested
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
        Some(n) => n,
        None => unreachable!(),
    };

    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(Self::DEFAULT_CAPACITY);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            metrics: Mutex::new(CacheMetrics::default()),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(Duration::from_secs(settings.ttl_seconds), settings.capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.lock_entries().cap().get()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .evictions += count as u64;
        }
    }

    /// Fresh entry for a key, if any
    pub fn get(&self, key: &CacheKey) -> Option<Arc<RiderAnalysis>> {
        let lookup = {
            let mut entries = self.lock_entries();
            let lookup = entries
                .get(key)
                .map(|entry| (entry.is_fresh(self.ttl), Arc::clone(&entry.analysis)));
            if let Some((false, _)) = lookup {
                entries.pop(key);
            }
            lookup
        };

        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.total_lookups += 1;

        match lookup {
            Some((true, analysis)) => {
                metrics.cache_hits += 1;
                debug!(rider_id = %key.rider_id, "Analysis cache hit");
                Some(analysis)
            }
            Some((false, _)) => {
                metrics.cache_misses += 1;
                metrics.evictions += 1;
                debug!(rider_id = %key.rider_id, "Analysis cache entry expired");
                None
            }
            None => {
                metrics.cache_misses += 1;
                None
            }
        }
    }

    /// Store an analysis and hand back the shared handle
    ///
    /// Expired entries are dropped first; when the cache is still full the
    /// least recently used entry makes room.
    pub fn insert(&self, key: CacheKey, analysis: RiderAnalysis) -> Arc<RiderAnalysis> {
        let analysis = Arc::new(analysis);
        let entry = CacheEntry {
            analysis: Arc::clone(&analysis),
            cached_at: Instant::now(),
        };

        let evicted = {
            let mut entries = self.lock_entries();
            let mut evicted = Self::drop_expired(&mut entries, self.ttl);
            if let Some((old_key, _)) = entries.push(key.clone(), entry) {
                if old_key != key {
                    debug!(rider_id = %old_key.rider_id, "Analysis cache full, evicted oldest entry");
                    evicted += 1;
                }
            }
            evicted
        };

        self.record_evictions(evicted);
        analysis
    }

    fn drop_expired(entries: &mut LruCache<CacheKey, CacheEntry>, ttl: Duration) -> usize {
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Drop every entry for a rider; returns how many were removed
    pub fn invalidate(&self, rider_id: &str) -> usize {
        let removed = {
            let mut entries = self.lock_entries();
            let matching: Vec<CacheKey> = entries
                .iter()
                .filter(|(key, _)| key.rider_id == rider_id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &matching {
                entries.pop(key);
            }
            matching.len()
        };

        self.record_evictions(removed);
        debug!(rider_id, removed, "Invalidated cached analyses");
        removed
    }

    /// Drop entries older than the TTL
    pub fn purge_expired(&self) -> usize {
        let removed = Self::drop_expired(&mut self.lock_entries(), self.ttl);
        self.record_evictions(removed);
        removed
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
