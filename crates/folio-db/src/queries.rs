use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::{Database, KvStore};

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_value(conn, key, now_millis()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = expiry_millis(ttl)?;
        self.with_conn(|conn| upsert_value(conn, key, value, expires_at))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: &mut dyn FnMut(Option<String>) -> Result<Option<String>>,
    ) -> Result<()> {
        let expires_at = expiry_millis(ttl)?;
        self.with_conn_mut(|conn| {
            // IMMEDIATE takes the write lock up front, so no other connection can
            // slip a write in between our read and our write.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = query_value(&tx, key, now_millis())?;
            if let Some(next) = f(current)? {
                upsert_value(&tx, key, &next, expires_at)?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

impl Database {
    /// Delete entries past their expiry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now_millis()],
            )?;
            Ok(removed)
        })
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn expiry_millis(ttl: Option<Duration>) -> Result<Option<i64>> {
    ttl.map(|ttl| Ok(now_millis().saturating_add(i64::try_from(ttl.as_millis())?)))
        .transpose()
}

fn query_value(conn: &Connection, key: &str, now: i64) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
    )?;

    let value = stmt
        .query_row(rusqlite::params![key, now], |row| row.get(0))
        .optional()?;

    Ok(value)
}

fn upsert_value(conn: &Connection, key: &str, value: &str, expires_at: Option<i64>) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value, expires_at, updated_at) VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
        rusqlite::params![key, value, expires_at],
    )?;
    debug!("kv write {} ({} bytes)", key, value.len());
    Ok(())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
