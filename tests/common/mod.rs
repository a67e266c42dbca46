#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use board::application::board::BoardService;
use board::application::repos::{BoardWriteRepo, EntityStore};
use board::cache::{BoardCache, CacheConfig, KvError, KvStore, MemoryKv};
use board::infra::memory::MemoryStore;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKv>,
    pub cache: BoardCache,
    pub service: BoardService,
}

pub fn harness() -> Harness {
    harness_with(CacheConfig::default())
}

pub fn harness_with(config: CacheConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryKv::new());
    let cache = BoardCache::new(
        Arc::clone(&kv) as Arc<dyn KvStore>,
        Arc::clone(&store) as Arc<dyn EntityStore>,
        config,
    );
    let service = BoardService::new(
        Arc::clone(&store) as Arc<dyn EntityStore>,
        Arc::clone(&store) as Arc<dyn BoardWriteRepo>,
        cache.clone(),
    );
    Harness {
        store,
        kv,
        cache,
        service,
    }
}

/// Wraps a [`MemoryKv`] and can be switched offline at runtime.
#[derive(Default)]
pub struct SwitchableKv {
    inner: MemoryKv,
    down: AtomicBool,
}

impl SwitchableKv {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryKv {
        &self.inner
    }

    fn check(&self) -> Result<(), KvError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for SwitchableKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.check()?;
        self.inner.delete(key).await
    }
}
