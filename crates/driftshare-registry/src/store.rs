//! Share persistence backends.
//!
//! Reads always filter on `now < expires_at`, so an entry the sweep has not
//! reached yet is still invisible once it expires.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::error::{RegistryError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEntry {
    pub token: String,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ShareEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Storage behind a [`ShareRegistry`](crate::ShareRegistry).
pub trait ShareStore: Send + Sync {
    /// Store a new entry. Returns false if the token is already taken.
    fn insert(&self, entry: &ShareEntry) -> Result<bool>;

    /// Live entry for `token` at `now`.
    fn get(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>>;

    /// Delete entries expired at `now`. Returns how many were removed.
    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Stored entries, expired ones included.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// ── Memory ──

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, ShareEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RegistryError {
    RegistryError::Store(format!("share map lock poisoned: {}", e))
}

impl ShareStore for MemoryStore {
    fn insert(&self, entry: &ShareEntry) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.entry(entry.token.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(true)
            }
        }
    }

    fn get(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(token).filter(|e| e.is_live(now)).cloned())
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }
}

// ── SQLite ──

/// SQLite-backed store. Timestamps are unix milliseconds; `expires_at` is
/// fixed when the row is written.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&conn)?;

        info!("Share DB opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RegistryError::Store(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS shares (
            token       TEXT PRIMARY KEY,
            endpoint    TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            expires_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_shares_expires
            ON shares(expires_at);
        ",
    )?;
    Ok(())
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

impl ShareStore for SqliteStore {
    fn insert(&self, entry: &ShareEntry) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO shares (token, endpoint, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.token,
                    entry.endpoint,
                    entry.created_at.timestamp_millis(),
                    entry.expires_at.timestamp_millis(),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    fn get(&self, token: &str, now: DateTime<Utc>) -> Result<Option<ShareEntry>> {
        self.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT token, endpoint, created_at, expires_at FROM shares
                     WHERE token = ?1 AND expires_at > ?2",
                    params![token, now.timestamp_millis()],
                    |row| {
                        Ok(ShareEntry {
                            token: row.get(0)?,
                            endpoint: row.get(1)?,
                            created_at: from_millis(row.get(2)?)?,
                            expires_at: from_millis(row.get(3)?)?,
                        })
                    },
                )
                .optional()?;
            Ok(entry)
        })
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM shares WHERE expires_at <= ?1",
                params![now.timestamp_millis()],
            )?;
            Ok(removed)
        })
    }

    fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM shares", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}
