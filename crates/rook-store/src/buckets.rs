//! Named buckets of key → bytes entries.
//!
//! Buckets must be created before use; reads and writes against a missing
//! bucket fail with [`StoreError::NoBucket`]. Scans return entries in key
//! order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::StoreError;

/// One stored entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    pub created_at: String,
    pub updated_at: String,
}

/// Key-value access over named buckets.
#[derive(Clone)]
pub struct BucketStore {
    db: Database,
}

/// Fixed-width RFC 3339 so timestamps compare correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ensure_bucket(conn: &Connection, bucket: &str) -> Result<(), StoreError> {
    let exists = conn
        .query_row("SELECT 1 FROM buckets WHERE name = ?1", [bucket], |_| Ok(()))
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::NoBucket(bucket.to_string()))
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        key: row.get(0)?,
        value: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

impl BucketStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create `bucket` unless it already exists. Returns true if created.
    #[instrument(skip(self))]
    pub fn create_bucket_if_absent(&self, bucket: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
                params![bucket, timestamp(Utc::now())],
            )?;
            if inserted > 0 {
                debug!(bucket, "bucket created");
            }
            Ok(inserted > 0)
        })
    }

    /// Read the value under `key`, or `None` if the key is absent.
    #[instrument(skip(self))]
    pub fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let value = conn
                .query_row(
                    "SELECT value FROM entries WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Full entry under `key`, with its timestamps.
    pub fn entry(&self, bucket: &str, key: &str) -> Result<Option<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let entry = conn
                .query_row(
                    "SELECT key, value, created_at, updated_at FROM entries
                     WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                    row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
    }

    /// Write `value` under `key`, overwriting any prior value.
    #[instrument(skip(self, value), fields(len = value.len()))]
    pub fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let now = timestamp(Utc::now());
            let _ = conn.execute(
                "INSERT INTO entries (bucket, key, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(bucket, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![bucket, key, value, now],
            )?;
            Ok(())
        })
    }

    /// Write `value` under `key` only if the key is unused.
    #[instrument(skip(self, value), fields(len = value.len()))]
    pub fn insert_new(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let now = timestamp(Utc::now());
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO entries (bucket, key, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![bucket, key, value, now],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(format!("{bucket}/{key} already exists")));
            }
            Ok(())
        })
    }

    /// Every entry in `bucket`, ordered by key.
    #[instrument(skip(self))]
    pub fn scan(&self, bucket: &str) -> Result<Vec<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let mut stmt = conn.prepare(
                "SELECT key, value, created_at, updated_at FROM entries
                 WHERE bucket = ?1 ORDER BY key",
            )?;
            let rows = stmt
                .query_map([bucket], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Number of entries in `bucket`.
    pub fn count(&self, bucket: &str) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE bucket = ?1",
                [bucket],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Remove entries last written before `cutoff`. Returns how many went.
    #[instrument(skip(self), fields(cutoff = %cutoff))]
    pub fn delete_older_than(
        &self,
        bucket: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            ensure_bucket(conn, bucket)?;
            let removed = conn.execute(
                "DELETE FROM entries WHERE bucket = ?1 AND updated_at < ?2",
                params![bucket, timestamp(cutoff)],
            )?;
            Ok(removed)
        })
    }

    /// Overwrite an entry's `updated_at`.
    #[cfg(test)]
    pub(crate) fn touch(&self, bucket: &str, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "UPDATE entries SET updated_at = ?3 WHERE bucket = ?1 AND key = ?2",
                params![bucket, key, timestamp(at)],
            )?;
            Ok(())
        })
    }
}
