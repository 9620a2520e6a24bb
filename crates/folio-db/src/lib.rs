pub mod collection;
pub mod keys;
pub mod memory;
pub mod migrations;
pub mod queries;

pub use collection::Collection;
pub use memory::MemoryKv;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// How long a writer waits on another connection's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// String key-value persistence. Every collection is one JSON blob under a
/// fixed key, read and rewritten whole.
pub trait KvStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value`, replacing any previous one. `ttl` of `None` never expires.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write of one key. `f` receives the current value and returns
    /// the value to store, or `None` to leave the key untouched.
    ///
    /// The default is a plain `get` followed by `set`: two writers that
    /// interleave lose one of their updates. Backends that can do better
    /// override it.
    fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: &mut dyn FnMut(Option<String>) -> Result<Option<String>>,
    ) -> Result<()> {
        let current = self.get(key)?;
        match f(current)? {
            Some(next) => self.set(key, &next, ttl),
            None => Ok(()),
        }
    }
}

/// SQLite-backed key-value store. Updates run inside an immediate
/// transaction, so concurrent appends from other handles or processes
/// on the same file are serialized rather than lost.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}
