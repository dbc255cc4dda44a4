use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::version::error::StoreError;
use crate::version::store::JsonStore;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Last upstream version seen for a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// TTL-bounded upstream version cache
pub struct Cache {
    store: JsonStore<CacheEntry>,
    ttl: TimeDelta,
    clock: Clock,
}

impl Cache {
    pub fn new(path: &Path, ttl: Duration) -> Self {
        Self::with_clock(path, ttl, Arc::new(Utc::now))
    }

    pub fn with_clock(path: &Path, ttl: Duration, clock: Clock) -> Self {
        info!("Opening version cache at {:?}", path);
        Self {
            store: JsonStore::open(path),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// An entry is expired once its age reaches the TTL
    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.timestamp) < self.ttl
    }

    /// Get the cached entry for `key` if it has not expired
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let now = (self.clock)();
        self.store.read(|entries| {
            entries
                .get(key)
                .filter(|entry| self.is_fresh(entry, now))
                .cloned()
        })
    }

    /// Get the cached version for `key` if it has not expired
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_entry(key)?.map(|entry| entry.version))
    }

    /// Like [`Cache::get`], but always misses when `force` is set
    pub fn get_bypassing(&self, key: &str, force: bool) -> Result<Option<String>, StoreError> {
        if force {
            debug!("Cache bypassed for {}", key);
            return Ok(None);
        }
        self.get(key)
    }

    /// Record `version` for `key`, stamped with the current time
    pub fn set(&self, key: &str, version: &str, source: &str) -> Result<(), StoreError> {
        let entry = CacheEntry {
            version: version.to_string(),
            timestamp: (self.clock)(),
            source: source.to_string(),
        };
        self.store.update(|entries| {
            entries.insert(key.to_string(), entry);
            Ok(())
        })
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store
            .update(|entries| Ok(entries.remove(key).is_some()))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.update(|entries| {
            entries.clear();
            Ok(())
        })
    }

    /// Remove expired entries; returns how many were removed
    pub fn cleanup(&self) -> Result<usize, StoreError> {
        let now = (self.clock)();
        let removed = self.store.update(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| self.is_fresh(entry, now));
            Ok(before - entries.len())
        })?;
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
