use tracing::{info, instrument};

use crate::application::repos::{CreateNotificationParams, CreateReplyParams};
use crate::cache::WriteEvent;
use crate::domain::entities::ReplyRecord;

use super::types::ensure_non_empty;
use super::{AddReplyCommand, BoardError, BoardService};

impl BoardService {
    /// Add a reply, then notify mentioned users and, when someone else
    /// replies, the topic author. Notices are best-effort once the reply has
    /// committed.
    #[instrument(skip(self, command), fields(topic_id = command.topic_id))]
    pub async fn add_reply(&self, command: AddReplyCommand) -> Result<ReplyRecord, BoardError> {
        ensure_non_empty(&command.content, "content")?;
        let author = self.require_user(command.author_id).await?;
        let topic = self.require_topic(command.topic_id).await?;

        let reply = self
            .writer
            .create_reply(CreateReplyParams {
                topic_id: topic.id,
                author_id: author.id,
                content: command.content,
            })
            .await?;

        self.cache
            .invalidate(&WriteEvent::ReplyCreated {
                topic_id: topic.id,
                reply_id: reply.id,
                author_id: author.id,
            })
            .await;

        let mut notified = self.notify_mentions(&author, topic.id, &reply.content).await;
        if author.id != topic.author_id {
            let notice = CreateNotificationParams {
                receiver_id: topic.author_id,
                title: format!("{} replied to your topic", author.username),
                content: format!(
                    "{} posted a new reply in your topic {}: /topic/{}",
                    author.username, topic.title, topic.id
                ),
            };
            if self.send_notice(notice).await {
                notified.push(topic.author_id);
            }
        }
        if !notified.is_empty() {
            self.cache
                .invalidate(&WriteEvent::NotificationsSent {
                    receiver_ids: notified,
                })
                .await;
        }

        info!(reply_id = reply.id, "reply added");
        Ok(reply)
    }

    /// The reply author and the topic author may both delete a reply.
    #[instrument(skip(self))]
    pub async fn delete_reply(&self, actor_id: i64, reply_id: i64) -> Result<(), BoardError> {
        let reply = self
            .cache
            .reply(reply_id)
            .await?
            .ok_or_else(|| BoardError::not_found("reply"))?;
        let topic = self.require_topic(reply.topic_id).await?;
        if actor_id != reply.author_id && actor_id != topic.author_id {
            return Err(BoardError::forbidden("delete this reply"));
        }

        let removed = self.writer.delete_reply(reply_id).await?;
        self.cache
            .invalidate(&WriteEvent::ReplyDeleted {
                topic_id: removed.topic_id,
                reply_id: removed.id,
                author_id: removed.author_id,
            })
            .await;

        info!(reply_id, topic_id = removed.topic_id, "reply deleted");
        Ok(())
    }
}
