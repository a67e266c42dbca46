//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicFilter {
    pub author_id: Option<i64>,
    pub board_id: Option<i64>,
}

impl TopicFilter {
    pub fn by_author(author_id: i64) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyFilter {
    pub topic_id: Option<i64>,
    pub author_id: Option<i64>,
}

impl ReplyFilter {
    pub fn by_topic(topic_id: i64) -> Self {
        Self {
            topic_id: Some(topic_id),
            ..Self::default()
        }
    }

    pub fn by_author(author_id: i64) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub sender_id: Option<i64>,
    pub receiver_id: Option<i64>,
    pub read: Option<bool>,
}

impl MessageFilter {
    pub fn by_sender(sender_id: i64) -> Self {
        Self {
            sender_id: Some(sender_id),
            ..Self::default()
        }
    }

    pub fn by_receiver(receiver_id: i64) -> Self {
        Self {
            receiver_id: Some(receiver_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub receiver_id: Option<i64>,
    pub read: Option<bool>,
}

impl NotificationFilter {
    pub fn by_receiver(receiver_id: i64) -> Self {
        Self {
            receiver_id: Some(receiver_id),
            ..Self::default()
        }
    }
}

/// Authoritative read access. Scans carry no ordering guarantee.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError>;

    async fn find_reply(&self, id: i64) -> Result<Option<ReplyRecord>, RepoError>;

    async fn find_message(&self, id: i64) -> Result<Option<MessageRecord>, RepoError>;

    async fn find_notification(&self, id: i64) -> Result<Option<NotificationRecord>, RepoError>;

    async fn list_topics(&self, filter: &TopicFilter) -> Result<Vec<TopicRecord>, RepoError>;

    async fn list_replies(&self, filter: &ReplyFilter) -> Result<Vec<ReplyRecord>, RepoError>;

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageRecord>, RepoError>;

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateTopicParams {
    pub title: String,
    pub content: String,
    pub board_id: i64,
    pub author_id: i64,
}

#[derive(Debug, Clone)]
pub struct UpdateTopicParams {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub board_id: i64,
}

#[derive(Debug, Clone)]
pub struct CreateReplyParams {
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreateMessageParams {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreateNotificationParams {
    pub receiver_id: i64,
    pub title: String,
    pub content: String,
}

/// Partial user update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub id: i64,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub signature: Option<String>,
}

/// Authoritative writes. Every mutation that touches cached data is followed
/// by an invalidation at the call site.
#[async_trait]
pub trait BoardWriteRepo: Send + Sync {
    async fn create_topic(&self, params: CreateTopicParams) -> Result<TopicRecord, RepoError>;

    /// Replace title, content and board; stamps `last_edited_at` and `last_active_at`.
    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError>;

    /// Increment the view counter, returning the updated topic.
    async fn record_topic_view(&self, id: i64) -> Result<Option<TopicRecord>, RepoError>;

    /// Delete a topic together with its replies, returning the removed reply ids.
    async fn delete_topic(&self, id: i64) -> Result<Vec<i64>, RepoError>;

    /// Insert a reply and bump the topic's reply count and activity markers.
    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError>;

    /// Delete a reply and roll the topic's counters back to the newest remaining reply.
    async fn delete_reply(&self, id: i64) -> Result<ReplyRecord, RepoError>;

    async fn create_message(&self, params: CreateMessageParams) -> Result<MessageRecord, RepoError>;

    /// Returns `true` when the message flipped from unread to read.
    async fn mark_message_read(&self, id: i64) -> Result<bool, RepoError>;

    /// Mark every unread message of `receiver_id` read, returning the ids that changed.
    async fn mark_messages_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError>;

    async fn delete_message(&self, id: i64) -> Result<(), RepoError>;

    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError>;

    async fn mark_notification_read(&self, id: i64) -> Result<bool, RepoError>;

    async fn mark_notifications_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError>;

    async fn delete_notification(&self, id: i64) -> Result<(), RepoError>;

    /// Delete every read notification of `receiver_id`, returning the removed ids.
    async fn delete_read_notifications(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError>;

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;
}
