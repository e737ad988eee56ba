//! Key/value caches for reflected schema metadata

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use records_common::config::CacheConfig;

/// Byte cache with per-entry time-to-live
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Store a value; returns whether it was stored
    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool;

    fn clear(&self);
}

/// Cache that stores nothing
#[derive(Debug, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Option<Bytes> {
        None
    }

    fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> bool {
        false
    }

    fn clear(&self) {}
}

/// In-process cache; expired entries are dropped on access
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Bytes, Instant)>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.1 > now {
                return Some(entry.0.clone());
            }
        }
        self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        None
    }

    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        true
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Cache selected by configuration
#[must_use]
pub fn create_cache(config: &CacheConfig) -> Arc<dyn Cache> {
    if config.enabled && config.ttl_secs > 0 {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(NoCache)
    }
}

/// Stable digest identifying a connection target
#[must_use]
pub fn fingerprint(url: &str, schema: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0]);
    hasher.update(schema.as_bytes());
    hex::encode(hasher.finalize())
}
