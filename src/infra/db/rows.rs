use time::OffsetDateTime;

use crate::domain::entities::{
    MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord,
};

pub(super) const USER_COLUMNS: &str =
    "id, username, password_hash, email, avatar, signature, created_at, updated_at";
pub(super) const TOPIC_COLUMNS: &str = "id, title, content, board_id, author_id, views, \
     reply_count, last_active_at, last_edited_at, last_reply_author_id, created_at, updated_at";
pub(super) const REPLY_COLUMNS: &str = "id, topic_id, author_id, content, created_at, updated_at";
pub(super) const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, title, content, read, created_at, updated_at";
pub(super) const NOTIFICATION_COLUMNS: &str =
    "id, receiver_id, title, content, read, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(super) struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    email: String,
    avatar: String,
    signature: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            email: row.email,
            avatar: row.avatar,
            signature: row.signature,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct TopicRow {
    id: i64,
    title: String,
    content: String,
    board_id: i64,
    author_id: i64,
    views: i64,
    reply_count: i64,
    last_active_at: OffsetDateTime,
    last_edited_at: OffsetDateTime,
    last_reply_author_id: Option<i64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TopicRow> for TopicRecord {
    fn from(row: TopicRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            board_id: row.board_id,
            author_id: row.author_id,
            views: row.views,
            reply_count: row.reply_count,
            last_active_at: row.last_active_at,
            last_edited_at: row.last_edited_at,
            last_reply_author_id: row.last_reply_author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ReplyRow {
    id: i64,
    topic_id: i64,
    author_id: i64,
    content: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl ReplyRow {
    pub(super) fn topic_id(&self) -> i64 {
        self.topic_id
    }
}

impl From<ReplyRow> for ReplyRecord {
    fn from(row: ReplyRow) -> Self {
        Self {
            id: row.id,
            topic_id: row.topic_id,
            author_id: row.author_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    title: String,
    content: String,
    read: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            title: row.title,
            content: row.content,
            read: row.read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct NotificationRow {
    id: i64,
    receiver_id: i64,
    title: String,
    content: String,
    read: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            receiver_id: row.receiver_id,
            title: row.title,
            content: row.content,
            read: row.read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
