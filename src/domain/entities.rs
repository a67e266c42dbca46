//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

use crate::domain::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub avatar: String,
    pub signature: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub board_id: i64,
    pub author_id: i64,
    pub views: i64,
    pub reply_count: i64,
    /// Creation time, or the time of the most recent reply.
    pub last_active_at: OffsetDateTime,
    pub last_edited_at: OffsetDateTime,
    pub last_reply_author_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRecord {
    pub id: i64,
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub title: String,
    pub content: String,
    pub read: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: i64,
    pub receiver_id: i64,
    pub title: String,
    pub content: String,
    pub read: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Any cacheable entity, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    User(UserRecord),
    Topic(TopicRecord),
    Reply(ReplyRecord),
    Message(MessageRecord),
    Notification(NotificationRecord),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::User(_) => EntityKind::User,
            Record::Topic(_) => EntityKind::Topic,
            Record::Reply(_) => EntityKind::Reply,
            Record::Message(_) => EntityKind::Message,
            Record::Notification(_) => EntityKind::Notification,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::User(user) => user.id,
            Record::Topic(topic) => topic.id,
            Record::Reply(reply) => reply.id,
            Record::Message(message) => message.id,
            Record::Notification(notification) => notification.id,
        }
    }
}

impl From<UserRecord> for Record {
    fn from(value: UserRecord) -> Self {
        Record::User(value)
    }
}

impl From<TopicRecord> for Record {
    fn from(value: TopicRecord) -> Self {
        Record::Topic(value)
    }
}

impl From<ReplyRecord> for Record {
    fn from(value: ReplyRecord) -> Self {
        Record::Reply(value)
    }
}

impl From<MessageRecord> for Record {
    fn from(value: MessageRecord) -> Self {
        Record::Message(value)
    }
}

impl From<NotificationRecord> for Record {
    fn from(value: NotificationRecord) -> Self {
        Record::Notification(value)
    }
}
