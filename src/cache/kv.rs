//! Key-value cache backend port and the in-process implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::kv";

#[derive(Debug, Error)]
pub enum KvError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// String key-value store with optional per-entry expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store `value`; `ttl = None` keeps the entry until it is deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Delete every key as one batch. A failed key does not stop the rest;
    /// the last failure is returned after all keys were attempted.
    async fn delete_many(&self, keys: &[String]) -> Result<(), KvError> {
        let mut failure = None;
        for key in keys {
            if let Err(err) = self.delete(key).await {
                failure = Some(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process store. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "contains")
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw write without expiry, for seeding state from tests and tools.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        rw_write(&self.entries, SOURCE, "insert_raw").insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: None,
            },
        );
    }

    /// Current value of `key`, ignoring expiry bookkeeping.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "peek")
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = rw_write(&self.entries, SOURCE, "expire");
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        rw_write(&self.entries, SOURCE, "set").insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), KvError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_many");
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let kv = MemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(kv.get("b").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let kv = MemoryKv::new();
        kv.set("short", "1", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        kv.set("forever", "2", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(kv.contains("short"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(kv.get("short").await.unwrap(), None);
        assert_eq!(kv.get("forever").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let kv = MemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        kv.delete("a").await.unwrap();
        kv.delete("a").await.unwrap();
        kv.delete_many(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(kv.is_empty());
    }

    struct FlakyKv {
        inner: MemoryKv,
        broken: &'static str,
    }

    #[async_trait]
    impl KvStore for FlakyKv {
        async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), KvError> {
            if key == self.broken {
                return Err(KvError::Backend("refused".to_string()));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn default_batch_delete_attempts_every_key() {
        let kv = FlakyKv {
            inner: MemoryKv::new(),
            broken: "b",
        };
        for key in ["a", "b", "c"] {
            kv.set(key, "v", None).await.unwrap();
        }

        let keys = ["a", "b", "c"].map(String::from);
        let result = kv.delete_many(&keys).await;

        assert!(matches!(result, Err(KvError::Backend(_))));
        assert!(!kv.inner.contains("a"));
        assert!(kv.inner.contains("b"));
        assert!(!kv.inner.contains("c"));
    }
}
