//! Ordered ID-list cache for one-to-many relations.
//!
//! An index stores only member IDs; members are resolved through the
//! [`EntityCache`] so each entity has a single snapshot regardless of how
//! many lists reference it.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::codec::{decode_ids, encode_ids};
use super::config::CacheConfig;
use super::entity::{CachedEntity, EntityCache};
use super::error::CacheError;
use super::keys::{CacheKey, IndexOrder, Relation};
use super::kv::{KvError, KvStore};
use super::metrics::{self, Tier};
use crate::application::repos::{
    EntityStore, MessageFilter, NotificationFilter, ReplyFilter, TopicFilter,
};
use crate::domain::entities::{MessageRecord, NotificationRecord, ReplyRecord, TopicRecord};

/// The timestamp an index is ordered by.
pub trait Recency {
    fn recency(&self) -> OffsetDateTime;
}

impl Recency for TopicRecord {
    fn recency(&self) -> OffsetDateTime {
        self.last_active_at
    }
}

impl Recency for ReplyRecord {
    fn recency(&self) -> OffsetDateTime {
        self.created_at
    }
}

impl Recency for MessageRecord {
    fn recency(&self) -> OffsetDateTime {
        self.created_at
    }
}

impl Recency for NotificationRecord {
    fn recency(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// Sort by recency, breaking ties by id in the same direction.
pub fn sort_members<E: CachedEntity + Recency>(members: &mut [E], order: IndexOrder) {
    let ascending = |a: &E, b: &E| -> Ordering {
        a.recency()
            .cmp(&b.recency())
            .then_with(|| a.id().cmp(&b.id()))
    };
    match order {
        IndexOrder::Ascending => members.sort_by(ascending),
        IndexOrder::Descending => members.sort_by(|a, b| ascending(b, a)),
    }
}

enum CachedIds {
    Hit(Vec<i64>),
    Miss { degraded: bool },
}

pub struct IndexCache {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn EntityStore>,
    entities: Arc<EntityCache>,
    config: CacheConfig,
}

impl IndexCache {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn EntityStore>,
        entities: Arc<EntityCache>,
        config: CacheConfig,
    ) -> Self {
        Self {
            kv,
            store,
            entities,
            config,
        }
    }

    fn render(&self, relation: Relation, owner_id: i64) -> String {
        CacheKey::index(relation, owner_id).render(&self.config.key_prefix)
    }

    /// Topics authored by `user_id`, most recently active first.
    #[instrument(skip(self))]
    pub async fn created_topics(&self, user_id: i64) -> Result<Vec<TopicRecord>, CacheError> {
        self.get_or_build(Relation::CreatedTopics, user_id, true, || async move {
            self.store
                .list_topics(&TopicFilter::by_author(user_id))
                .await
                .map_err(CacheError::from)
        })
        .await
    }

    /// Distinct topics `user_id` replied in, most recently active first.
    #[instrument(skip(self))]
    pub async fn replied_topics(&self, user_id: i64) -> Result<Vec<TopicRecord>, CacheError> {
        self.get_or_build(Relation::RepliedTopics, user_id, false, || async move {
            let mut replies = self
                .store
                .list_replies(&ReplyFilter::by_author(user_id))
                .await?;
            sort_members(&mut replies, IndexOrder::Descending);

            let mut topic_ids: Vec<i64> = Vec::with_capacity(replies.len());
            for reply in &replies {
                if !topic_ids.contains(&reply.topic_id) {
                    topic_ids.push(reply.topic_id);
                }
            }

            let mut topics = Vec::with_capacity(topic_ids.len());
            for topic_id in topic_ids {
                if let Some(topic) = self.entities.get_or_load::<TopicRecord>(topic_id).await? {
                    topics.push(topic);
                }
            }
            Ok::<_, CacheError>(topics)
        })
        .await
    }

    /// Replies under `topic_id`, oldest first.
    #[instrument(skip(self))]
    pub async fn topic_replies(&self, topic_id: i64) -> Result<Vec<ReplyRecord>, CacheError> {
        self.get_or_build(Relation::TopicReplies, topic_id, true, || async move {
            self.store
                .list_replies(&ReplyFilter::by_topic(topic_id))
                .await
                .map_err(CacheError::from)
        })
        .await
    }

    /// Messages received by `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn received_messages(&self, user_id: i64) -> Result<Vec<MessageRecord>, CacheError> {
        self.get_or_build(Relation::ReceivedMessages, user_id, true, || async move {
            self.store
                .list_messages(&MessageFilter::by_receiver(user_id))
                .await
                .map_err(CacheError::from)
        })
        .await
    }

    /// Messages sent by `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn sent_messages(&self, user_id: i64) -> Result<Vec<MessageRecord>, CacheError> {
        self.get_or_build(Relation::SentMessages, user_id, true, || async move {
            self.store
                .list_messages(&MessageFilter::by_sender(user_id))
                .await
                .map_err(CacheError::from)
        })
        .await
    }

    /// Notifications received by `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn received_notifications(
        &self,
        user_id: i64,
    ) -> Result<Vec<NotificationRecord>, CacheError> {
        self.get_or_build(Relation::ReceivedNotifications, user_id, true, || async move {
            self.store
                .list_notifications(&NotificationFilter::by_receiver(user_id))
                .await
                .map_err(CacheError::from)
        })
        .await
    }

    /// Remove the index for `(relation, owner_id)`.
    pub async fn evict(&self, relation: Relation, owner_id: i64) -> Result<(), KvError> {
        self.kv.delete(&self.render(relation, owner_id)).await?;
        metrics::evict(Tier::Index, 1);
        Ok(())
    }

    /// Serve the index from cache, or build it with `scan`.
    ///
    /// `warm_members` controls whether members found by the scan are written
    /// to the entity cache; scans that already resolved through it skip this.
    async fn get_or_build<E, F, Fut>(
        &self,
        relation: Relation,
        owner_id: i64,
        warm_members: bool,
        scan: F,
    ) -> Result<Vec<E>, CacheError>
    where
        E: CachedEntity + Recency,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<E>, CacheError>>,
    {
        let key = self.render(relation, owner_id);

        let mut members = match self.cached_ids(&key).await {
            CachedIds::Hit(ids) => self.resolve::<E>(&key, &ids).await?,
            CachedIds::Miss { degraded } => {
                let mut members = scan().await?;
                sort_members(&mut members, relation.order());
                if !degraded {
                    self.fill(&key, relation, &members, warm_members).await;
                }
                members
            }
        };

        if relation.resorts_on_read() {
            sort_members(&mut members, IndexOrder::Descending);
        }
        Ok(members)
    }

    async fn cached_ids(&self, key: &str) -> CachedIds {
        match self.kv.get(key).await {
            Ok(Some(payload)) => match decode_ids(&payload) {
                Ok(ids) => {
                    metrics::hit(Tier::Index);
                    CachedIds::Hit(ids)
                }
                Err(err) => {
                    metrics::decode_error(Tier::Index);
                    warn!(key, error = %err, "Discarding undecodable index");
                    self.discard(key).await;
                    CachedIds::Miss { degraded: false }
                }
            },
            Ok(None) => {
                metrics::miss(Tier::Index);
                CachedIds::Miss { degraded: false }
            }
            Err(err) => {
                metrics::degraded(Tier::Index);
                warn!(key, error = %err, "Index read failed; rebuilding from store");
                CachedIds::Miss { degraded: true }
            }
        }
    }

    /// Resolve cached IDs in stored order. IDs whose entity no longer exists
    /// are skipped and the index is dropped so the next read rebuilds it.
    async fn resolve<E: CachedEntity>(&self, key: &str, ids: &[i64]) -> Result<Vec<E>, CacheError> {
        let mut members = Vec::with_capacity(ids.len());
        let mut dangling = 0usize;
        for &id in ids {
            match self.entities.get_or_load::<E>(id).await? {
                Some(member) => members.push(member),
                None => dangling += 1,
            }
        }

        if dangling > 0 {
            warn!(key, dangling, "Index references missing entities; dropping it");
            self.discard(key).await;
        }
        Ok(members)
    }

    async fn fill<E: CachedEntity>(
        &self,
        key: &str,
        relation: Relation,
        members: &[E],
        warm_members: bool,
    ) {
        if warm_members {
            for member in members {
                self.entities.put(member).await;
            }
        }

        let ids: Vec<i64> = members.iter().map(|member| member.id()).collect();
        match self
            .kv
            .set(key, &encode_ids(&ids), self.config.index_ttl(relation))
            .await
        {
            Ok(()) => {
                metrics::fill(Tier::Index);
                debug!(key, members = ids.len(), "Index built");
            }
            Err(err) => warn!(key, error = %err, "Index fill failed"),
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(err) = self.kv.delete(key).await {
            warn!(key, error = %err, "Failed to discard index");
        }
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::cache::kv::MemoryKv;
    use crate::domain::entities::UserRecord;
    use crate::infra::memory::MemoryStore;

    const T0: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn topic(id: i64, author_id: i64, active_offset_mins: i64) -> TopicRecord {
        TopicRecord {
            id,
            title: format!("topic {id}"),
            content: String::new(),
            board_id: 1,
            author_id,
            views: 0,
            reply_count: 0,
            last_active_at: T0 + Duration::minutes(active_offset_mins),
            last_edited_at: T0,
            last_reply_author_id: None,
            created_at: T0,
            updated_at: T0,
        }
    }

    fn reply(id: i64, topic_id: i64, author_id: i64, offset_mins: i64) -> ReplyRecord {
        ReplyRecord {
            id,
            topic_id,
            author_id,
            content: format!("reply {id}"),
            created_at: T0 + Duration::minutes(offset_mins),
            updated_at: T0 + Duration::minutes(offset_mins),
        }
    }

    fn message(id: i64, sender_id: i64, receiver_id: i64, offset_mins: i64) -> MessageRecord {
        MessageRecord {
            id,
            sender_id,
            receiver_id,
            title: format!("message {id}"),
            content: String::new(),
            read: false,
            created_at: T0 + Duration::minutes(offset_mins),
            updated_at: T0 + Duration::minutes(offset_mins),
        }
    }

    fn setup() -> (Arc<MemoryKv>, Arc<MemoryStore>, IndexCache) {
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig::default();
        let entities = Arc::new(EntityCache::new(kv.clone(), store.clone(), config.clone()));
        let index = IndexCache::new(kv.clone(), store.clone(), entities, config);
        (kv, store, index)
    }

    fn ids<E: CachedEntity>(members: &[E]) -> Vec<i64> {
        members.iter().map(|member| member.id()).collect()
    }

    #[tokio::test]
    async fn replies_are_oldest_first() {
        let (_kv, store, index) = setup();
        store.seed_reply(reply(1, 10, 7, 30));
        store.seed_reply(reply(2, 10, 7, 10));
        store.seed_reply(reply(3, 10, 8, 20));
        store.seed_reply(reply(4, 11, 8, 0));

        let built = index.topic_replies(10).await.unwrap();
        let cached = index.topic_replies(10).await.unwrap();

        assert_eq!(ids(&built), vec![2, 3, 1]);
        assert_eq!(ids(&cached), vec![2, 3, 1]);
        assert_eq!(store.scans(), 1);
    }

    #[tokio::test]
    async fn messages_are_newest_first() {
        let (_kv, store, index) = setup();
        store.seed_message(message(1, 5, 6, 0));
        store.seed_message(message(2, 5, 6, 20));
        store.seed_message(message(3, 5, 6, 10));
        store.seed_message(message(4, 6, 5, 30));

        assert_eq!(ids(&index.received_messages(6).await.unwrap()), vec![2, 3, 1]);
        assert_eq!(ids(&index.sent_messages(5).await.unwrap()), vec![2, 3, 1]);
        assert_eq!(ids(&index.sent_messages(6).await.unwrap()), vec![4]);
    }

    #[tokio::test]
    async fn equal_timestamps_tie_break_on_id() {
        let (_kv, store, index) = setup();
        store.seed_message(message(8, 5, 6, 0));
        store.seed_message(message(3, 5, 6, 0));
        store.seed_reply(reply(9, 10, 7, 0));
        store.seed_reply(reply(4, 10, 7, 0));

        assert_eq!(ids(&index.received_messages(6).await.unwrap()), vec![8, 3]);
        assert_eq!(ids(&index.topic_replies(10).await.unwrap()), vec![4, 9]);
    }

    #[tokio::test]
    async fn topic_lists_resort_on_every_read() {
        let (_kv, store, index) = setup();
        store.seed_topic(topic(1, 7, 10));
        store.seed_topic(topic(2, 7, 20));

        assert_eq!(ids(&index.created_topics(7).await.unwrap()), vec![2, 1]);

        // A reply bumps topic 1 and evicts only its snapshot.
        store.seed_topic(topic(1, 7, 60));
        index
            .entities
            .evict(crate::domain::types::EntityKind::Topic, 1)
            .await
            .unwrap();

        assert_eq!(ids(&index.created_topics(7).await.unwrap()), vec![1, 2]);
        assert_eq!(store.scans(), 1);
    }

    #[tokio::test]
    async fn replied_topics_are_distinct() {
        let (_kv, store, index) = setup();
        store.seed_topic(topic(10, 1, 5));
        store.seed_topic(topic(11, 1, 50));
        store.seed_reply(reply(1, 10, 7, 0));
        store.seed_reply(reply(2, 11, 7, 1));
        store.seed_reply(reply(3, 10, 7, 2));

        let topics = index.replied_topics(7).await.unwrap();

        assert_eq!(ids(&topics), vec![11, 10]);
    }

    #[tokio::test]
    async fn dangling_ids_are_skipped_and_index_dropped() {
        let (kv, store, index) = setup();
        store.seed_user(UserRecord {
            id: 7,
            username: "seven".to_string(),
            password_hash: String::new(),
            email: String::new(),
            avatar: String::new(),
            signature: String::new(),
            created_at: T0,
            updated_at: T0,
        });
        store.seed_topic(topic(1, 7, 0));
        kv.insert_raw("user_id_7.created_topics", "[99,1]");

        let topics = index.created_topics(7).await.unwrap();

        assert_eq!(ids(&topics), vec![1]);
        assert!(!kv.contains("user_id_7.created_topics"));
    }

    #[tokio::test]
    async fn empty_relations_are_cached() {
        let (kv, store, index) = setup();

        assert!(index.received_messages(3).await.unwrap().is_empty());
        assert!(index.received_messages(3).await.unwrap().is_empty());

        assert_eq!(kv.peek("user_id_3.received_messages").as_deref(), Some("[]"));
        assert_eq!(store.scans(), 1);
    }

    #[tokio::test]
    async fn corrupt_index_is_rebuilt() {
        let (kv, store, index) = setup();
        store.seed_reply(reply(1, 10, 7, 0));
        kv.insert_raw("topic_id_10.replies", "not a list");

        assert_eq!(ids(&index.topic_replies(10).await.unwrap()), vec![1]);
        assert_eq!(kv.peek("topic_id_10.replies").as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn built_index_warms_member_snapshots() {
        let (kv, store, index) = setup();
        store.seed_reply(reply(1, 10, 7, 0));

        index.topic_replies(10).await.unwrap();

        assert!(kv.contains("reply_id_1.reply_info"));
        assert_eq!(store.point_loads(), 0);
    }
}
