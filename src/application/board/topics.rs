use tracing::{info, instrument};

use crate::application::repos::{CreateTopicParams, UpdateTopicParams};
use crate::cache::WriteEvent;
use crate::domain::entities::TopicRecord;

use super::types::{TITLE_MAX_CHARS, ensure_max_chars, ensure_non_empty};
use super::{BoardError, BoardService, CreateTopicCommand, EditTopicCommand, TopicDetail};

fn validate_topic_fields(title: &str, content: &str) -> Result<(), BoardError> {
    ensure_non_empty(title, "title")?;
    ensure_max_chars(title.trim(), TITLE_MAX_CHARS, "title")?;
    ensure_non_empty(content, "content")
}

impl BoardService {
    #[instrument(skip(self, command), fields(author_id = command.author_id))]
    pub async fn create_topic(&self, command: CreateTopicCommand) -> Result<TopicRecord, BoardError> {
        validate_topic_fields(&command.title, &command.content)?;
        let author = self.require_user(command.author_id).await?;

        let topic = self
            .writer
            .create_topic(CreateTopicParams {
                title: command.title.trim().to_string(),
                content: command.content,
                board_id: command.board_id,
                author_id: author.id,
            })
            .await?;

        self.cache
            .invalidate(&WriteEvent::TopicCreated {
                topic_id: topic.id,
                author_id: author.id,
            })
            .await;

        let mentioned = self.notify_mentions(&author, topic.id, &topic.content).await;
        if !mentioned.is_empty() {
            self.cache
                .invalidate(&WriteEvent::NotificationsSent {
                    receiver_ids: mentioned,
                })
                .await;
        }

        info!(topic_id = topic.id, "topic created");
        Ok(topic)
    }

    /// Only the author may edit a topic.
    #[instrument(skip(self, command), fields(topic_id = command.topic_id))]
    pub async fn edit_topic(&self, command: EditTopicCommand) -> Result<TopicRecord, BoardError> {
        validate_topic_fields(&command.title, &command.content)?;
        let existing = self.require_topic(command.topic_id).await?;
        if existing.author_id != command.actor_id {
            return Err(BoardError::forbidden("edit this topic"));
        }

        let topic = self
            .writer
            .update_topic(UpdateTopicParams {
                id: existing.id,
                title: command.title.trim().to_string(),
                content: command.content,
                board_id: command.board_id,
            })
            .await?;

        self.cache
            .invalidate(&WriteEvent::TopicEdited { topic_id: topic.id })
            .await;
        Ok(topic)
    }

    /// Count a view and load everything the topic page shows.
    ///
    /// The view counter lives in the topic snapshot, so every view evicts it.
    #[instrument(skip(self))]
    pub async fn view_topic(&self, topic_id: i64) -> Result<TopicDetail, BoardError> {
        let topic = self
            .writer
            .record_topic_view(topic_id)
            .await?
            .ok_or_else(|| BoardError::not_found("topic"))?;
        self.cache
            .invalidate(&WriteEvent::TopicViewed { topic_id })
            .await;

        let replies = self.cache.topic_replies(topic_id).await?;
        let author = self.cache.user(topic.author_id).await?;

        Ok(TopicDetail {
            topic,
            author,
            replies,
        })
    }

    /// Delete a topic and its replies. Only the author may delete it.
    #[instrument(skip(self))]
    pub async fn delete_topic(&self, actor_id: i64, topic_id: i64) -> Result<(), BoardError> {
        let topic = self.require_topic(topic_id).await?;
        if topic.author_id != actor_id {
            return Err(BoardError::forbidden("delete this topic"));
        }

        let reply_ids = self.writer.delete_topic(topic_id).await?;
        info!(topic_id, replies = reply_ids.len(), "topic deleted");

        self.cache
            .invalidate(&WriteEvent::TopicDeleted {
                topic_id,
                author_id: topic.author_id,
                reply_ids,
            })
            .await;
        Ok(())
    }

    pub async fn topic(&self, topic_id: i64) -> Result<TopicRecord, BoardError> {
        self.require_topic(topic_id).await
    }
}
