//! Time-bounded response cache.
//!
//! [`ResponseCache`] treats its backend as best effort: a failing store reads as
//! a miss and a failing write is logged, never surfaced to the request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::clock::Clock;
use crate::error::Result;

pub mod key;
pub mod sqlite;
pub mod store;

pub use key::{build_cache_key, is_bypass_param, BYPASS_PARAMS};
pub use sqlite::SqliteStore;
pub use store::{CacheStore, MemoryStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON as returned by the provider.
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Look up a fresh entry. Expired entries are deleted on the way out.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = match self.store.load(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                warn!("Cache read failed for {key}, treating as miss: {err}");
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!("Cache entry expired: {key}");
            self.delete(key);
            return None;
        }

        Some(entry)
    }

    /// Store `payload` for `ttl` and return the `fetched_at` stamp it was given.
    pub fn put(&self, key: &str, payload: String, ttl: Duration) -> DateTime<Utc> {
        let fetched_at = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = fetched_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at,
            expires_at,
        };

        if let Err(err) = self.store.save(&entry) {
            warn!("Cache write failed for {key}: {err}");
        }
        fetched_at
    }

    /// [`get`](Self::get) on the blocking pool, for callers on a runtime worker.
    pub async fn read(&self, key: &str) -> Option<CacheEntry> {
        let cache = self.clone();
        let key = key.to_string();
        match tokio::task::spawn_blocking(move || cache.get(&key)).await {
            Ok(entry) => entry,
            Err(join_err) => {
                warn!("Cache read task failed, treating as miss: {join_err}");
                None
            }
        }
    }

    /// [`put`](Self::put) on the blocking pool.
    pub async fn write(&self, key: &str, payload: String, ttl: Duration) -> DateTime<Utc> {
        let cache = self.clone();
        let owned_key = key.to_string();
        match tokio::task::spawn_blocking(move || cache.put(&owned_key, payload, ttl)).await {
            Ok(fetched_at) => fetched_at,
            Err(join_err) => {
                warn!("Cache write task failed for {key}: {join_err}");
                self.now()
            }
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            warn!("Cache delete failed for {key}: {err}");
        }
    }

    /// Administrative full clear. Unlike the request path, errors are returned.
    pub fn delete_all(&self) -> Result<usize> {
        self.store.clear()
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.store.remove_expired(self.clock.now())
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
