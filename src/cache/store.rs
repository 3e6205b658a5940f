use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::error::Result;

use super::CacheEntry;

/// Storage backend behind [`super::ResponseCache`].
///
/// Backends are fallible; the cache wrapper decides which failures degrade to a miss.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry stored under `entry.key`.
    fn save(&self, entry: &CacheEntry) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Drop every entry, returning how many were removed.
    fn clear(&self) -> Result<usize>;

    /// Drop entries whose expiry is at or before `now`.
    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    fn len(&self) -> Result<usize>;
}

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}
