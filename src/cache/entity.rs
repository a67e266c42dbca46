//! Read-through snapshot cache for single entities.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::codec::{FlatRecord, Snapshot};
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::kv::{KvError, KvStore};
use super::metrics::{self, Tier};
use crate::application::repos::{EntityStore, RepoError};
use crate::domain::entities::{
    MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord,
};
use crate::domain::types::EntityKind;

/// A snapshot type the cache knows how to load from the entity store.
#[async_trait]
pub trait CachedEntity: Snapshot + Send + Sync + 'static {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError>;
}

#[async_trait]
impl CachedEntity for UserRecord {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError> {
        store.find_user(id).await
    }
}

#[async_trait]
impl CachedEntity for TopicRecord {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError> {
        store.find_topic(id).await
    }
}

#[async_trait]
impl CachedEntity for ReplyRecord {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError> {
        store.find_reply(id).await
    }
}

#[async_trait]
impl CachedEntity for MessageRecord {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError> {
        store.find_message(id).await
    }
}

#[async_trait]
impl CachedEntity for NotificationRecord {
    async fn load(store: &dyn EntityStore, id: i64) -> Result<Option<Self>, RepoError> {
        store.find_notification(id).await
    }
}

enum Lookup<E> {
    Hit(E),
    Miss,
    /// The backend could not be reached; the result must not be written back.
    Degraded,
}

/// Snapshot cache keyed by `(kind, id)`.
///
/// Hits are served from the key-value store. Misses load from the entity
/// store and write the snapshot back with the per-kind TTL. Absent entities
/// are never cached.
pub struct EntityCache {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn EntityStore>,
    config: CacheConfig,
}

impl EntityCache {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn EntityStore>, config: CacheConfig) -> Self {
        Self { kv, store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn render(&self, kind: EntityKind, id: i64) -> String {
        CacheKey::entity(kind, id).render(&self.config.key_prefix)
    }

    /// Return the entity with `id`, loading and caching it on a miss.
    #[instrument(skip(self), fields(kind = %E::KIND))]
    pub async fn get_or_load<E: CachedEntity>(&self, id: i64) -> Result<Option<E>, CacheError> {
        let key = self.render(E::KIND, id);

        let degraded = match self.lookup::<E>(&key).await {
            Lookup::Hit(entity) => return Ok(Some(entity)),
            Lookup::Miss => false,
            Lookup::Degraded => true,
        };

        let Some(entity) = E::load(self.store.as_ref(), id).await? else {
            debug!(key = %key, "Entity absent from store; not cached");
            return Ok(None);
        };

        if !degraded {
            self.write(&key, &entity).await;
        }
        Ok(Some(entity))
    }

    async fn lookup<E: CachedEntity>(&self, key: &str) -> Lookup<E> {
        let payload = match self.kv.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                metrics::miss(Tier::Entity);
                return Lookup::Miss;
            }
            Err(err) => {
                metrics::degraded(Tier::Entity);
                warn!(key, error = %err, "Cache read failed; falling through to store");
                return Lookup::Degraded;
            }
        };

        match FlatRecord::from_json(&payload).and_then(|record| E::decode(&record)) {
            Ok(entity) => {
                metrics::hit(Tier::Entity);
                Lookup::Hit(entity)
            }
            Err(err) => {
                metrics::decode_error(Tier::Entity);
                warn!(key, error = %err, "Discarding undecodable snapshot");
                if let Err(err) = self.kv.delete(key).await {
                    warn!(key, error = %err, "Failed to discard undecodable snapshot");
                }
                Lookup::Miss
            }
        }
    }

    /// Store a snapshot for `entity`. Failures are logged and ignored.
    pub async fn put<E: CachedEntity>(&self, entity: &E) {
        let key = self.render(E::KIND, entity.id());
        self.write(&key, entity).await;
    }

    async fn write<E: CachedEntity>(&self, key: &str, entity: &E) {
        let record = match entity.encode() {
            Ok(record) => record,
            Err(err) => {
                warn!(key, error = %err, "Snapshot not encodable; serving uncached");
                return;
            }
        };

        match self
            .kv
            .set(key, &record.to_json(), self.config.entity_ttl(E::KIND))
            .await
        {
            Ok(()) => metrics::fill(Tier::Entity),
            Err(err) => warn!(key, error = %err, "Cache fill failed"),
        }
    }

    /// Remove the snapshot for `(kind, id)`. Removing an absent entry succeeds.
    pub async fn evict(&self, kind: EntityKind, id: i64) -> Result<(), KvError> {
        self.kv.delete(&self.render(kind, id)).await?;
        metrics::evict(Tier::Entity, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::cache::kv::MemoryKv;
    use crate::infra::memory::MemoryStore;

    struct DownKv;

    #[async_trait]
    impl KvStore for DownKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<std::time::Duration>,
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".to_string()))
        }
    }

    fn user(id: i64) -> UserRecord {
        UserRecord {
            id,
            username: format!("user{id}"),
            password_hash: "x".to_string(),
            email: format!("user{id}@example.com"),
            avatar: String::new(),
            signature: String::new(),
            created_at: datetime!(2024-03-01 10:00:00 UTC),
            updated_at: datetime!(2024-03-01 10:00:00 UTC),
        }
    }

    fn setup() -> (Arc<MemoryKv>, Arc<MemoryStore>, EntityCache) {
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(MemoryStore::new());
        let cache = EntityCache::new(kv.clone(), store.clone(), CacheConfig::default());
        (kv, store, cache)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (kv, store, cache) = setup();
        store.seed_user(user(1));

        let first = cache.get_or_load::<UserRecord>(1).await.unwrap();
        let second = cache.get_or_load::<UserRecord>(1).await.unwrap();

        assert_eq!(first, Some(user(1)));
        assert_eq!(second, first);
        assert_eq!(store.point_loads(), 1);
        assert!(kv.contains("user_id_1.user_info"));
    }

    #[tokio::test]
    async fn absent_entities_are_not_cached() {
        let (kv, store, cache) = setup();

        assert_eq!(cache.get_or_load::<UserRecord>(9).await.unwrap(), None);
        assert_eq!(cache.get_or_load::<UserRecord>(9).await.unwrap(), None);

        assert_eq!(store.point_loads(), 2);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn undecodable_snapshot_is_replaced() {
        let (kv, store, cache) = setup();
        store.seed_user(user(1));
        kv.insert_raw("user_id_1.user_info", "{\"id\":\"garbage\"}");

        let loaded = cache.get_or_load::<UserRecord>(1).await.unwrap();

        assert_eq!(loaded, Some(user(1)));
        assert_eq!(store.point_loads(), 1);
        let repaired = kv.peek("user_id_1.user_info").expect("snapshot rewritten");
        assert!(repaired.contains("\"username\":\"user1\""));
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_store_reads() {
        let store = Arc::new(MemoryStore::new());
        store.seed_user(user(1));
        let cache = EntityCache::new(Arc::new(DownKv), store.clone(), CacheConfig::default());

        assert_eq!(
            cache.get_or_load::<UserRecord>(1).await.unwrap(),
            Some(user(1))
        );
        assert_eq!(
            cache.get_or_load::<UserRecord>(1).await.unwrap(),
            Some(user(1))
        );
        assert_eq!(store.point_loads(), 2);
    }

    #[tokio::test]
    async fn store_failure_propagates_and_caches_nothing() {
        let (kv, store, cache) = setup();
        store.seed_user(user(1));
        store.set_unavailable(true);

        let result = cache.get_or_load::<UserRecord>(1).await;

        assert!(matches!(result, Err(CacheError::Store(_))));
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn prefix_applies_to_snapshot_keys() {
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(MemoryStore::new());
        store.seed_user(user(4));
        let config = CacheConfig {
            key_prefix: "bbs:".to_string(),
            ..CacheConfig::default()
        };
        let cache = EntityCache::new(kv.clone(), store, config);

        cache.get_or_load::<UserRecord>(4).await.unwrap();
        assert!(kv.contains("bbs:user_id_4.user_info"));

        cache.evict(EntityKind::User, 4).await.unwrap();
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_timestamps_are_served_uncached() {
        let (kv, store, cache) = setup();
        let mut far_future = user(2);
        far_future.updated_at = datetime!(2400-01-01 00:00:00 UTC);
        store.seed_user(far_future.clone());

        assert_eq!(
            cache.get_or_load::<UserRecord>(2).await.unwrap(),
            Some(far_future)
        );
        assert!(kv.is_empty());
    }
}
