//! In-process entity store.
//!
//! Backs tests and local tooling. Writes follow the same rules as the
//! Postgres adapter, and every read bumps an access counter so callers can
//! assert on cache effectiveness.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::application::repos::{
    BoardWriteRepo, CreateMessageParams, CreateNotificationParams, CreateReplyParams,
    CreateTopicParams, EntityStore, MessageFilter, NotificationFilter, ReplyFilter, RepoError,
    TopicFilter, UpdateTopicParams, UpdateUserParams,
};
use crate::cache::lock::mutex_lock;
use crate::domain::entities::{
    MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord,
};

const SOURCE: &str = "infra::memory";
const DEFAULT_AVATAR: &str = "/images/default_profile.jpg";

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    last_tick: Option<OffsetDateTime>,
    users: BTreeMap<i64, UserRecord>,
    topics: BTreeMap<i64, TopicRecord>,
    replies: BTreeMap<i64, ReplyRecord>,
    messages: BTreeMap<i64, MessageRecord>,
    notifications: BTreeMap<i64, NotificationRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve_id(&mut self, id: i64) {
        self.next_id = self.next_id.max(id);
    }

    /// Strictly increasing wall-clock time, so ordering never depends on
    /// clock resolution.
    fn tick(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let now = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(now);
        now
    }

    fn refresh_topic_activity(&mut self, topic_id: i64, now: OffsetDateTime) {
        let newest = self
            .replies
            .values()
            .filter(|reply| reply.topic_id == topic_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|reply| (reply.created_at, reply.author_id));
        let remaining = self
            .replies
            .values()
            .filter(|reply| reply.topic_id == topic_id)
            .count();

        if let Some(topic) = self.topics.get_mut(&topic_id) {
            topic.reply_count = remaining as i64;
            match newest {
                Some((created_at, author_id)) => {
                    topic.last_active_at = created_at;
                    topic.last_reply_author_id = Some(author_id);
                }
                None => {
                    topic.last_active_at = topic.created_at;
                    topic.last_reply_author_id = None;
                }
            }
            topic.updated_at = now;
        }
    }
}

/// Thread-safe in-memory implementation of both repository ports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    point_loads: AtomicUsize,
    scans: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of by-id or by-name lookups served so far.
    pub fn point_loads(&self) -> usize {
        self.point_loads.load(Ordering::SeqCst)
    }

    /// Number of list scans served so far.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.point_loads.store(0, Ordering::SeqCst);
        self.scans.store(0, Ordering::SeqCst);
    }

    /// Make every read fail with a persistence error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("store offline".to_string()));
        }
        Ok(())
    }

    fn point_load(&self) -> Result<(), RepoError> {
        self.check_available()?;
        self.point_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scan(&self) -> Result<(), RepoError> {
        self.check_available()?;
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Register a user with the default avatar and an empty signature.
    pub fn add_user(&self, username: &str, email: &str) -> UserRecord {
        let mut tables = mutex_lock(&self.tables, SOURCE, "add_user");
        let now = tables.tick();
        let user = UserRecord {
            id: tables.allocate_id(),
            username: username.to_string(),
            password_hash: String::new(),
            email: email.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            signature: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        user
    }

    pub fn seed_user(&self, user: UserRecord) {
        let mut tables = mutex_lock(&self.tables, SOURCE, "seed_user");
        tables.reserve_id(user.id);
        tables.users.insert(user.id, user);
    }

    pub fn seed_topic(&self, topic: TopicRecord) {
        let mut tables = mutex_lock(&self.tables, SOURCE, "seed_topic");
        tables.reserve_id(topic.id);
        tables.topics.insert(topic.id, topic);
    }

    pub fn seed_reply(&self, reply: ReplyRecord) {
        let mut tables = mutex_lock(&self.tables, SOURCE, "seed_reply");
        tables.reserve_id(reply.id);
        tables.replies.insert(reply.id, reply);
    }

    pub fn seed_message(&self, message: MessageRecord) {
        let mut tables = mutex_lock(&self.tables, SOURCE, "seed_message");
        tables.reserve_id(message.id);
        tables.messages.insert(message.id, message);
    }

    pub fn seed_notification(&self, notification: NotificationRecord) {
        let mut tables = mutex_lock(&self.tables, SOURCE, "seed_notification");
        tables.reserve_id(notification.id);
        tables.notifications.insert(notification.id, notification);
    }
}

fn matches(filter: Option<i64>, value: i64) -> bool {
    filter.is_none_or(|expected| expected == value)
}

fn matches_flag(filter: Option<bool>, value: bool) -> bool {
    filter.is_none_or(|expected| expected == value)
}

/// Scans hand rows back newest id first; callers must sort for presentation.
fn newest_first<T>(rows: impl DoubleEndedIterator<Item = T>) -> Vec<T> {
    rows.rev().collect()
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_user")
            .users
            .get(&id)
            .cloned())
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_user_by_name")
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_topic")
            .topics
            .get(&id)
            .cloned())
    }

    async fn find_reply(&self, id: i64) -> Result<Option<ReplyRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_reply")
            .replies
            .get(&id)
            .cloned())
    }

    async fn find_message(&self, id: i64) -> Result<Option<MessageRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_message")
            .messages
            .get(&id)
            .cloned())
    }

    async fn find_notification(&self, id: i64) -> Result<Option<NotificationRecord>, RepoError> {
        self.point_load()?;
        Ok(mutex_lock(&self.tables, SOURCE, "find_notification")
            .notifications
            .get(&id)
            .cloned())
    }

    async fn list_topics(&self, filter: &TopicFilter) -> Result<Vec<TopicRecord>, RepoError> {
        self.scan()?;
        let tables = mutex_lock(&self.tables, SOURCE, "list_topics");
        Ok(newest_first(
            tables
                .topics
                .values()
                .filter(|topic| {
                    matches(filter.author_id, topic.author_id)
                        && matches(filter.board_id, topic.board_id)
                })
                .cloned(),
        ))
    }

    async fn list_replies(&self, filter: &ReplyFilter) -> Result<Vec<ReplyRecord>, RepoError> {
        self.scan()?;
        let tables = mutex_lock(&self.tables, SOURCE, "list_replies");
        Ok(newest_first(
            tables
                .replies
                .values()
                .filter(|reply| {
                    matches(filter.topic_id, reply.topic_id)
                        && matches(filter.author_id, reply.author_id)
                })
                .cloned(),
        ))
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageRecord>, RepoError> {
        self.scan()?;
        let tables = mutex_lock(&self.tables, SOURCE, "list_messages");
        Ok(newest_first(
            tables
                .messages
                .values()
                .filter(|message| {
                    matches(filter.sender_id, message.sender_id)
                        && matches(filter.receiver_id, message.receiver_id)
                        && matches_flag(filter.read, message.read)
                })
                .cloned(),
        ))
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        self.scan()?;
        let tables = mutex_lock(&self.tables, SOURCE, "list_notifications");
        Ok(newest_first(
            tables
                .notifications
                .values()
                .filter(|notification| {
                    matches(filter.receiver_id, notification.receiver_id)
                        && matches_flag(filter.read, notification.read)
                })
                .cloned(),
        ))
    }
}

#[async_trait]
impl BoardWriteRepo for MemoryStore {
    async fn create_topic(&self, params: CreateTopicParams) -> Result<TopicRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "create_topic");
        if !tables.users.contains_key(&params.author_id) {
            return Err(RepoError::InvalidInput {
                message: format!("author {} does not exist", params.author_id),
            });
        }
        let now = tables.tick();
        let topic = TopicRecord {
            id: tables.allocate_id(),
            title: params.title,
            content: params.content,
            board_id: params.board_id,
            author_id: params.author_id,
            views: 0,
            reply_count: 0,
            last_active_at: now,
            last_edited_at: now,
            last_reply_author_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.topics.insert(topic.id, topic.clone());
        Ok(topic)
    }

    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "update_topic");
        let now = tables.tick();
        let topic = tables
            .topics
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        topic.title = params.title;
        topic.content = params.content;
        topic.board_id = params.board_id;
        topic.last_edited_at = now;
        topic.last_active_at = now;
        topic.updated_at = now;
        Ok(topic.clone())
    }

    async fn record_topic_view(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "record_topic_view");
        Ok(tables.topics.get_mut(&id).map(|topic| {
            topic.views += 1;
            topic.clone()
        }))
    }

    async fn delete_topic(&self, id: i64) -> Result<Vec<i64>, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "delete_topic");
        if tables.topics.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        let reply_ids: Vec<i64> = tables
            .replies
            .values()
            .filter(|reply| reply.topic_id == id)
            .map(|reply| reply.id)
            .collect();
        for reply_id in &reply_ids {
            tables.replies.remove(reply_id);
        }
        Ok(reply_ids)
    }

    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "create_reply");
        if !tables.topics.contains_key(&params.topic_id) {
            return Err(RepoError::NotFound);
        }
        let now = tables.tick();
        let reply = ReplyRecord {
            id: tables.allocate_id(),
            topic_id: params.topic_id,
            author_id: params.author_id,
            content: params.content,
            created_at: now,
            updated_at: now,
        };
        tables.replies.insert(reply.id, reply.clone());
        tables.refresh_topic_activity(reply.topic_id, now);
        Ok(reply)
    }

    async fn delete_reply(&self, id: i64) -> Result<ReplyRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "delete_reply");
        let reply = tables.replies.remove(&id).ok_or(RepoError::NotFound)?;
        let now = tables.tick();
        tables.refresh_topic_activity(reply.topic_id, now);
        Ok(reply)
    }

    async fn create_message(&self, params: CreateMessageParams) -> Result<MessageRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "create_message");
        let now = tables.tick();
        let message = MessageRecord {
            id: tables.allocate_id(),
            sender_id: params.sender_id,
            receiver_id: params.receiver_id,
            title: params.title,
            content: params.content,
            read: false,
            created_at: now,
            updated_at: now,
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn mark_message_read(&self, id: i64) -> Result<bool, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "mark_message_read");
        let now = tables.tick();
        let message = tables.messages.get_mut(&id).ok_or(RepoError::NotFound)?;
        if message.read {
            return Ok(false);
        }
        message.read = true;
        message.updated_at = now;
        Ok(true)
    }

    async fn mark_messages_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "mark_messages_read");
        let now = tables.tick();
        let mut changed = Vec::new();
        for message in tables.messages.values_mut() {
            if message.receiver_id == receiver_id && !message.read {
                message.read = true;
                message.updated_at = now;
                changed.push(message.id);
            }
        }
        Ok(changed)
    }

    async fn delete_message(&self, id: i64) -> Result<(), RepoError> {
        mutex_lock(&self.tables, SOURCE, "delete_message")
            .messages
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "create_notification");
        let now = tables.tick();
        let notification = NotificationRecord {
            id: tables.allocate_id(),
            receiver_id: params.receiver_id,
            title: params.title,
            content: params.content,
            read: false,
            created_at: now,
            updated_at: now,
        };
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<bool, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "mark_notification_read");
        let now = tables.tick();
        let notification = tables
            .notifications
            .get_mut(&id)
            .ok_or(RepoError::NotFound)?;
        if notification.read {
            return Ok(false);
        }
        notification.read = true;
        notification.updated_at = now;
        Ok(true)
    }

    async fn mark_notifications_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "mark_notifications_read");
        let now = tables.tick();
        let mut changed = Vec::new();
        for notification in tables.notifications.values_mut() {
            if notification.receiver_id == receiver_id && !notification.read {
                notification.read = true;
                notification.updated_at = now;
                changed.push(notification.id);
            }
        }
        Ok(changed)
    }

    async fn delete_notification(&self, id: i64) -> Result<(), RepoError> {
        mutex_lock(&self.tables, SOURCE, "delete_notification")
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn delete_read_notifications(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "delete_read_notifications");
        let swept: Vec<i64> = tables
            .notifications
            .values()
            .filter(|notification| notification.receiver_id == receiver_id && notification.read)
            .map(|notification| notification.id)
            .collect();
        for id in &swept {
            tables.notifications.remove(id);
        }
        Ok(swept)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = mutex_lock(&self.tables, SOURCE, "update_user");
        if let Some(username) = params.username.as_deref()
            && tables
                .users
                .values()
                .any(|user| user.username == username && user.id != params.id)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }

        let now = tables.tick();
        let user = tables.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if let Some(username) = params.username {
            user.username = username;
        }
        if let Some(password_hash) = params.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(avatar) = params.avatar {
            user.avatar = avatar;
        }
        if let Some(signature) = params.signature {
            user.signature = signature;
        }
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_move_topic_activity_and_roll_back() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice", "alice@example.com");
        let bob = store.add_user("bob", "bob@example.com");
        let topic = store
            .create_topic(CreateTopicParams {
                title: "hello".to_string(),
                content: "first".to_string(),
                board_id: 1,
                author_id: alice.id,
            })
            .await
            .unwrap();

        let first = store
            .create_reply(CreateReplyParams {
                topic_id: topic.id,
                author_id: bob.id,
                content: "r1".to_string(),
            })
            .await
            .unwrap();
        let second = store
            .create_reply(CreateReplyParams {
                topic_id: topic.id,
                author_id: alice.id,
                content: "r2".to_string(),
            })
            .await
            .unwrap();

        let bumped = store.find_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(bumped.reply_count, 2);
        assert_eq!(bumped.last_active_at, second.created_at);
        assert_eq!(bumped.last_reply_author_id, Some(alice.id));

        store.delete_reply(second.id).await.unwrap();
        let rolled = store.find_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(rolled.reply_count, 1);
        assert_eq!(rolled.last_active_at, first.created_at);
        assert_eq!(rolled.last_reply_author_id, Some(bob.id));

        store.delete_reply(first.id).await.unwrap();
        let bare = store.find_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(bare.reply_count, 0);
        assert_eq!(bare.last_active_at, topic.created_at);
        assert_eq!(bare.last_reply_author_id, None);
    }

    #[tokio::test]
    async fn deleting_topic_returns_reply_ids() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice", "alice@example.com");
        let topic = store
            .create_topic(CreateTopicParams {
                title: "t".to_string(),
                content: "c".to_string(),
                board_id: 1,
                author_id: alice.id,
            })
            .await
            .unwrap();
        let reply = store
            .create_reply(CreateReplyParams {
                topic_id: topic.id,
                author_id: alice.id,
                content: "r".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(store.delete_topic(topic.id).await.unwrap(), vec![reply.id]);
        assert!(store.find_reply(reply.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_topic(topic.id).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn usernames_stay_unique() {
        let store = MemoryStore::new();
        store.add_user("alice", "a@example.com");
        let bob = store.add_user("bob", "b@example.com");

        let result = store
            .update_user(UpdateUserParams {
                id: bob.id,
                username: Some("alice".to_string()),
                ..UpdateUserParams::default()
            })
            .await;

        assert!(matches!(result, Err(RepoError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn counters_track_reads() {
        let store = MemoryStore::new();
        store.find_user(1).await.unwrap();
        store
            .list_topics(&TopicFilter::default())
            .await
            .unwrap();
        assert_eq!((store.point_loads(), store.scans()), (1, 1));

        store.reset_counters();
        store.set_unavailable(true);
        assert!(store.find_user(1).await.is_err());
        assert_eq!(store.point_loads(), 0);
    }
}
