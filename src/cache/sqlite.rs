use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{AppError, Context, Result};

use super::{CacheEntry, CacheStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    expiry INTEGER NOT NULL
)";

/// SQLite-backed store; entries survive a restart of the relay.
///
/// Timestamps are persisted as epoch milliseconds.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create cache directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn).map_err(AppError::from)
    }
}

impl CacheStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT data, fetched_at, expiry FROM cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
        })?;

        let Some((payload, fetched_at, expiry)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: from_millis(fetched_at)?,
            expires_at: from_millis(expiry)?,
        }))
    }

    fn save(&self, entry: &CacheEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache (key, data, fetched_at, expiry) VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.key,
                    entry.payload,
                    entry.fetched_at.timestamp_millis(),
                    entry.expires_at.timestamp_millis()
                ],
            )
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM cache WHERE key = ?1", params![key]))?;
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        self.with_conn(|conn| conn.execute("DELETE FROM cache", []))
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cache WHERE expiry <= ?1",
                params![now.timestamp_millis()],
            )
        })
    }

    fn len(&self) -> Result<usize> {
        let count = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get::<_, i64>(0))
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppError::message(format!("invalid timestamp {millis} in cache table")))
}
