//! Typed JSON-array views over a single key.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::KvStore;

/// A flat list of records persisted as one JSON blob under `key`.
///
/// Corrupt blobs never surface as errors: they are logged, dropped, and read
/// as an empty list.
pub struct Collection<T> {
    store: Arc<dyn KvStore>,
    key: &'static str,
    ttl: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key,
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KvStore>, key: &'static str, ttl: Option<Duration>) -> Self {
        Self {
            store,
            key,
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Current contents, in insertion order.
    pub fn load(&self) -> Result<Vec<T>> {
        let Some(raw) = self.store.get(self.key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!("Discarding corrupt collection '{}': {}", self.key, e);
                self.store.remove(self.key)?;
                Ok(Vec::new())
            }
        }
    }

    /// Read-modify-write the whole list. Nothing is written if `f` leaves the
    /// list unchanged. Atomic only when the backing store's `update` is.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        let key = self.key;
        let mut f = Some(f);
        let mut out = None;

        self.store.update(key, self.ttl, &mut |raw| {
            let mut items: Vec<T> = match raw.as_deref().map(serde_json::from_str) {
                None => Vec::new(),
                Some(Ok(items)) => items,
                Some(Err(e)) => {
                    warn!("Discarding corrupt collection '{}': {}", key, e);
                    Vec::new()
                }
            };

            let f = f.take().ok_or_else(|| anyhow!("collection update ran twice"))?;
            out = Some(f(&mut items));

            if raw.is_none() && items.is_empty() {
                return Ok(None);
            }
            let next = serde_json::to_string(&items)?;
            if raw.as_deref() == Some(next.as_str()) {
                return Ok(None);
            }
            Ok(Some(next))
        })?;

        out.ok_or_else(|| anyhow!("collection update did not run"))
    }

    /// Append one record.
    pub fn push(&self, item: T) -> Result<()> {
        self.update(|items| items.push(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;

    fn numbers(kv: Arc<dyn KvStore>) -> Collection<u32> {
        Collection::new(kv, "numbers", None)
    }

    #[test]
    fn missing_key_is_empty() {
        let col = numbers(Arc::new(MemoryKv::new()));
        assert!(col.load().unwrap().is_empty());
    }

    #[test]
    fn push_preserves_insertion_order() {
        let col = numbers(Arc::new(MemoryKv::new()));
        col.push(3).unwrap();
        col.push(1).unwrap();
        col.push(2).unwrap();
        assert_eq!(col.load().unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn corrupt_blob_reads_empty_and_is_purged() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("numbers", "{not json", None).unwrap();

        let col = numbers(kv.clone());
        assert!(col.load().unwrap().is_empty());
        assert!(kv.get("numbers").unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_is_replaced_on_update() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("numbers", "[1, 2", None).unwrap();

        let col = numbers(kv.clone());
        col.push(7).unwrap();
        assert_eq!(col.load().unwrap(), vec![7]);
    }

    #[test]
    fn empty_update_leaves_key_absent() {
        let kv = Arc::new(MemoryKv::new());
        let col = numbers(kv.clone());
        col.update(|items| items.retain(|n| *n > 10)).unwrap();
        assert!(kv.get("numbers").unwrap().is_none());
    }

    #[test]
    fn unchanged_update_does_not_write() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("numbers", "[1,2]", Some(Duration::from_secs(60))).unwrap();

        let col = numbers(kv.clone());
        let len = col.update(|items| items.len()).unwrap();
        assert_eq!(len, 2);
        assert_eq!(kv.get("numbers").unwrap().as_deref(), Some("[1,2]"));
    }
}
