//! Board Cache System
//!
//! Cache-aside read layer in front of the authoritative entity store:
//!
//! - **Entity cache**: one flat snapshot per `(kind, id)` with a per-kind TTL
//! - **Index cache**: ordered ID lists per relation owner, resolved through
//!   the entity cache
//! - **Trigger**: maps each write event to the keys it can stale and evicts
//!   them in one batch
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/1"
//! key_prefix = ""
//!
//! [cache.ttl]
//! topic = 300
//! replies = 900
//! # ... see config.rs for all options; 0 disables expiry
//! ```

mod codec;
mod config;
mod entity;
mod error;
mod events;
mod index;
mod keys;
mod kv;
pub(crate) mod lock;
pub(crate) mod metrics;
mod planner;
mod trigger;

use std::sync::Arc;

pub use codec::{
    DecodeError, EncodeError, FieldValue, FlatRecord, Snapshot, decode_ids, encode_ids,
};
pub use config::{CacheConfig, TtlConfig};
pub use entity::{CachedEntity, EntityCache};
pub use error::CacheError;
pub use events::{Epoch, EpochCounter, WriteEvent};
pub use index::{IndexCache, Recency, sort_members};
pub use keys::{CacheKey, IndexOrder, Relation};
pub use kv::{KvError, KvStore, MemoryKv};
pub use planner::EvictionPlan;
pub use trigger::CacheTrigger;

use crate::application::repos::EntityStore;
use crate::domain::entities::{
    MessageRecord, NotificationRecord, Record, ReplyRecord, TopicRecord, UserRecord,
};
use crate::domain::types::EntityKind;

/// Read and invalidation entry point shared by every call site.
#[derive(Clone)]
pub struct BoardCache {
    entities: Arc<EntityCache>,
    indexes: Arc<IndexCache>,
    trigger: Arc<CacheTrigger>,
}

impl BoardCache {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn EntityStore>, config: CacheConfig) -> Self {
        let entities = Arc::new(EntityCache::new(
            Arc::clone(&kv),
            Arc::clone(&store),
            config.clone(),
        ));
        let indexes = Arc::new(IndexCache::new(
            Arc::clone(&kv),
            store,
            Arc::clone(&entities),
            config.clone(),
        ));
        let trigger = Arc::new(CacheTrigger::new(config, kv));
        Self {
            entities,
            indexes,
            trigger,
        }
    }

    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    pub fn indexes(&self) -> &IndexCache {
        &self.indexes
    }

    pub fn trigger(&self) -> &CacheTrigger {
        &self.trigger
    }

    /// Read one entity of any kind.
    pub async fn read_entity(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, CacheError> {
        let record = match kind {
            EntityKind::User => self.user(id).await?.map(Record::from),
            EntityKind::Topic => self.topic(id).await?.map(Record::from),
            EntityKind::Reply => self.reply(id).await?.map(Record::from),
            EntityKind::Message => self.message(id).await?.map(Record::from),
            EntityKind::Notification => self.notification(id).await?.map(Record::from),
        };
        Ok(record)
    }

    /// Read the members of one relation in its presentation order.
    pub async fn read_relation(
        &self,
        relation: Relation,
        owner_id: i64,
    ) -> Result<Vec<Record>, CacheError> {
        fn records<E: Into<Record>>(members: Vec<E>) -> Vec<Record> {
            members.into_iter().map(Into::into).collect()
        }

        let members = match relation {
            Relation::CreatedTopics => records(self.indexes.created_topics(owner_id).await?),
            Relation::RepliedTopics => records(self.indexes.replied_topics(owner_id).await?),
            Relation::TopicReplies => records(self.indexes.topic_replies(owner_id).await?),
            Relation::ReceivedMessages => {
                records(self.indexes.received_messages(owner_id).await?)
            }
            Relation::SentMessages => records(self.indexes.sent_messages(owner_id).await?),
            Relation::ReceivedNotifications => {
                records(self.indexes.received_notifications(owner_id).await?)
            }
        };
        Ok(members)
    }

    pub async fn user(&self, id: i64) -> Result<Option<UserRecord>, CacheError> {
        self.entities.get_or_load(id).await
    }

    pub async fn topic(&self, id: i64) -> Result<Option<TopicRecord>, CacheError> {
        self.entities.get_or_load(id).await
    }

    pub async fn reply(&self, id: i64) -> Result<Option<ReplyRecord>, CacheError> {
        self.entities.get_or_load(id).await
    }

    pub async fn message(&self, id: i64) -> Result<Option<MessageRecord>, CacheError> {
        self.entities.get_or_load(id).await
    }

    pub async fn notification(&self, id: i64) -> Result<Option<NotificationRecord>, CacheError> {
        self.entities.get_or_load(id).await
    }

    pub async fn created_topics(&self, user_id: i64) -> Result<Vec<TopicRecord>, CacheError> {
        self.indexes.created_topics(user_id).await
    }

    pub async fn replied_topics(&self, user_id: i64) -> Result<Vec<TopicRecord>, CacheError> {
        self.indexes.replied_topics(user_id).await
    }

    pub async fn topic_replies(&self, topic_id: i64) -> Result<Vec<ReplyRecord>, CacheError> {
        self.indexes.topic_replies(topic_id).await
    }

    pub async fn received_messages(&self, user_id: i64) -> Result<Vec<MessageRecord>, CacheError> {
        self.indexes.received_messages(user_id).await
    }

    pub async fn sent_messages(&self, user_id: i64) -> Result<Vec<MessageRecord>, CacheError> {
        self.indexes.sent_messages(user_id).await
    }

    pub async fn received_notifications(
        &self,
        user_id: i64,
    ) -> Result<Vec<NotificationRecord>, CacheError> {
        self.indexes.received_notifications(user_id).await
    }

    /// Apply the eviction plan for one write event. Never fails.
    pub async fn invalidate(&self, event: &WriteEvent) {
        self.trigger.invalidate(event).await;
    }

    /// Apply the merged eviction plan for several events. Never fails.
    pub async fn invalidate_all(&self, events: &[WriteEvent]) {
        self.trigger.invalidate_all(events).await;
    }

    pub async fn evict_entity(&self, kind: EntityKind, id: i64) -> Result<(), KvError> {
        self.entities.evict(kind, id).await
    }

    pub async fn evict_relation(&self, relation: Relation, owner_id: i64) -> Result<(), KvError> {
        self.indexes.evict(relation, owner_id).await
    }
}
