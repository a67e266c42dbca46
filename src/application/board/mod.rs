//! Board write services.
//!
//! Each mutation commits through [`BoardWriteRepo`] first and then applies
//! the matching [`WriteEvent`] so later reads rebuild from the store. Reads
//! go through [`BoardCache`].

mod messages;
mod notifications;
mod replies;
mod topics;
pub mod types;
mod users;

pub use types::{
    AddReplyCommand, BoardError, ChangePasswordCommand, CreateTopicCommand, EditTopicCommand,
    Inbox, NotificationBox, Recipient, SendMessageCommand, TopicDetail, UpdateProfileCommand,
    ensure_max_chars, ensure_non_empty,
};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::repos::{BoardWriteRepo, CreateNotificationParams, EntityStore};
use crate::cache::BoardCache;
use crate::domain::entities::{TopicRecord, UserRecord};
use crate::domain::mentions::mentioned_names;

#[derive(Clone)]
pub struct BoardService {
    reader: Arc<dyn EntityStore>,
    writer: Arc<dyn BoardWriteRepo>,
    cache: BoardCache,
}

impl BoardService {
    pub fn new(
        reader: Arc<dyn EntityStore>,
        writer: Arc<dyn BoardWriteRepo>,
        cache: BoardCache,
    ) -> Self {
        Self {
            reader,
            writer,
            cache,
        }
    }

    pub fn cache(&self) -> &BoardCache {
        &self.cache
    }

    async fn require_user(&self, user_id: i64) -> Result<UserRecord, BoardError> {
        self.cache
            .user(user_id)
            .await?
            .ok_or_else(|| BoardError::not_found("user"))
    }

    async fn require_topic(&self, topic_id: i64) -> Result<TopicRecord, BoardError> {
        self.cache
            .topic(topic_id)
            .await?
            .ok_or_else(|| BoardError::not_found("topic"))
    }

    /// Notify every existing user mentioned in `content`, returning the ids
    /// that were actually notified. Unknown names are ignored.
    ///
    /// Runs after the primary write has committed, so a failed lookup or
    /// insert is logged and skipped instead of failing the caller.
    async fn notify_mentions(
        &self,
        caller: &UserRecord,
        topic_id: i64,
        content: &str,
    ) -> Vec<i64> {
        let mut receivers = Vec::new();
        for name in mentioned_names(content) {
            let user = match self.reader.find_user_by_name(&name).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    debug!(name = %name, topic_id, "mentioned user does not exist");
                    continue;
                }
                Err(err) => {
                    warn!(name = %name, topic_id, error = %err, "mention lookup failed");
                    continue;
                }
            };
            let notice = CreateNotificationParams {
                receiver_id: user.id,
                title: format!("{} mentioned you", caller.username),
                content: format!(
                    "{} mentioned you in topic {topic_id}: /topic/{topic_id}",
                    caller.username
                ),
            };
            if self.send_notice(notice).await {
                receivers.push(user.id);
            }
        }
        receivers
    }

    async fn send_notice(&self, params: CreateNotificationParams) -> bool {
        let receiver_id = params.receiver_id;
        match self.writer.create_notification(params).await {
            Ok(_) => true,
            Err(err) => {
                warn!(receiver_id, error = %err, "notification not delivered");
                false
            }
        }
    }
}
