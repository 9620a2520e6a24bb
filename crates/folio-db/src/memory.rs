//! In-process key-value store

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::KvStore;
use crate::queries::{expiry_millis, now_millis};

struct Entry {
    value: String,
    expires_at: Option<i64>,
}

/// Volatile store with the naive read-modify-write `update`.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|e| anyhow!("kv lock poisoned: {}", e))?;
        let now = now_millis();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = expiry_millis(ttl)?;
        self.entries
            .write()
            .map_err(|e| anyhow!("kv lock poisoned: {}", e))?
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|e| anyhow!("kv lock poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}
