use thiserror::Error;

use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::entities::{
    MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord,
};

pub const TITLE_MAX_CHARS: usize = 50;
pub const USERNAME_MAX_CHARS: usize = 50;
pub const SIGNATURE_MAX_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid `{field}`: {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("not allowed to {action}")]
    Forbidden { action: &'static str },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl BoardError {
    pub(crate) fn validation(field: &'static str, reason: &'static str) -> Self {
        Self::Validation { field, reason }
    }

    pub(crate) fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub(crate) fn forbidden(action: &'static str) -> Self {
        Self::Forbidden { action }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTopicCommand {
    pub author_id: i64,
    pub board_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct EditTopicCommand {
    pub actor_id: i64,
    pub topic_id: i64,
    pub board_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct AddReplyCommand {
    pub author_id: i64,
    pub topic_id: i64,
    pub content: String,
}

/// Message receiver, addressed by id or by username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    pub sender_id: i64,
    pub receiver: Recipient,
    pub title: String,
    pub content: String,
}

/// Hashing happens before the service sees the password.
#[derive(Debug, Clone)]
pub struct ChangePasswordCommand {
    pub user_id: i64,
    pub current_password_hash: String,
    pub new_password_hash: String,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileCommand {
    pub user_id: i64,
    pub username: String,
    pub signature: String,
}

/// Everything the topic page renders.
#[derive(Debug, Clone)]
pub struct TopicDetail {
    pub topic: TopicRecord,
    pub author: Option<UserRecord>,
    pub replies: Vec<ReplyRecord>,
}

/// Received messages split by read state, newest first within each half.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    pub unread: Vec<MessageRecord>,
    pub read: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationBox {
    pub unread: Vec<NotificationRecord>,
    pub read: Vec<NotificationRecord>,
}

pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), BoardError> {
    if value.trim().is_empty() {
        return Err(BoardError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub fn ensure_max_chars(value: &str, max: usize, field: &'static str) -> Result<(), BoardError> {
    if value.chars().count() > max {
        return Err(BoardError::validation(field, "is too long"));
    }
    Ok(())
}
