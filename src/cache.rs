//! Matcher result cache.
//!
//! The matcher memoizes its output keyed by a [`Checksum`] of its inputs.
//! Stored values are canonical expression strings so any backend that can
//! hold strings can serve as a store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::checksum::Checksum;

/// Key/value store for memoized match results
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &Checksum) -> Option<Vec<String>>;

    /// Last write wins; concurrent writers of one key store identical values
    fn set(&self, key: &Checksum, value: Vec<String>);
}

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Process-local cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Vec<String>>>,
    stats: CacheStats,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry (e.g. after the catalog changed)
    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.write() {
            guard.clear();
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &Checksum) -> Option<Vec<String>> {
        let guard = self.entries.read().ok()?;
        match guard.get(key.as_str()) {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &Checksum, value: Vec<String>) {
        // A poisoned lock only costs us memoization
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(key.as_str().to_string(), value);
        }
    }
}
