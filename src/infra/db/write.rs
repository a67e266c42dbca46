use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::{
    application::repos::{
        BoardWriteRepo, CreateMessageParams, CreateNotificationParams, CreateReplyParams,
        CreateTopicParams, RepoError, UpdateTopicParams, UpdateUserParams,
    },
    domain::entities::{MessageRecord, NotificationRecord, ReplyRecord, TopicRecord, UserRecord},
};

use super::{
    PostgresRepositories,
    rows::{
        MESSAGE_COLUMNS, MessageRow, NOTIFICATION_COLUMNS, NotificationRow, REPLY_COLUMNS,
        ReplyRow, TOPIC_COLUMNS, TopicRow, USER_COLUMNS, UserRow,
    },
    util::map_sqlx_error,
};

/// Recompute reply count and activity markers from the replies that remain.
const REFRESH_TOPIC_ACTIVITY: &str = "\
    UPDATE topics t SET \
        reply_count = (SELECT COUNT(*) FROM replies r WHERE r.topic_id = t.id), \
        last_active_at = COALESCE( \
            (SELECT MAX(r.created_at) FROM replies r WHERE r.topic_id = t.id), \
            t.created_at), \
        last_reply_author_id = ( \
            SELECT r.author_id FROM replies r WHERE r.topic_id = t.id \
            ORDER BY r.created_at DESC, r.id DESC LIMIT 1), \
        updated_at = now() \
    WHERE t.id = $1";

async fn refresh_topic_activity(
    tx: &mut Transaction<'_, Postgres>,
    topic_id: i64,
) -> Result<(), RepoError> {
    sqlx::query(REFRESH_TOPIC_ACTIVITY)
        .bind(topic_id)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

fn ids_of(rows: Vec<(i64,)>) -> Vec<i64> {
    rows.into_iter().map(|(id,)| id).collect()
}

#[async_trait]
impl BoardWriteRepo for PostgresRepositories {
    async fn create_topic(&self, params: CreateTopicParams) -> Result<TopicRecord, RepoError> {
        let row = sqlx::query_as::<_, TopicRow>(&format!(
            "INSERT INTO topics (title, content, board_id, author_id) \
             VALUES ($1, $2, $3, $4) RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(params.title)
        .bind(params.content)
        .bind(params.board_id)
        .bind(params.author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError> {
        let row = sqlx::query_as::<_, TopicRow>(&format!(
            "UPDATE topics SET title = $2, content = $3, board_id = $4, \
             last_edited_at = now(), last_active_at = now(), updated_at = now() \
             WHERE id = $1 RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.title)
        .bind(params.content)
        .bind(params.board_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(TopicRecord::from).ok_or(RepoError::NotFound)
    }

    async fn record_topic_view(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        let row = sqlx::query_as::<_, TopicRow>(&format!(
            "UPDATE topics SET views = views + 1 WHERE id = $1 RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TopicRecord::from))
    }

    async fn delete_topic(&self, id: i64) -> Result<Vec<i64>, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let replies = sqlx::query_as::<_, (i64,)>(
            "DELETE FROM replies WHERE topic_id = $1 RETURNING id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ids_of(replies))
    }

    async fn create_reply(&self, params: CreateReplyParams) -> Result<ReplyRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let topic = sqlx::query_as::<_, (i64,)>("SELECT id FROM topics WHERE id = $1 FOR UPDATE")
            .bind(params.topic_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if topic.is_none() {
            return Err(RepoError::NotFound);
        }

        let row = sqlx::query_as::<_, ReplyRow>(&format!(
            "INSERT INTO replies (topic_id, author_id, content) \
             VALUES ($1, $2, $3) RETURNING {REPLY_COLUMNS}"
        ))
        .bind(params.topic_id)
        .bind(params.author_id)
        .bind(params.content)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        refresh_topic_activity(&mut tx, params.topic_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn delete_reply(&self, id: i64) -> Result<ReplyRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, ReplyRow>(&format!(
            "DELETE FROM replies WHERE id = $1 RETURNING {REPLY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        refresh_topic_activity(&mut tx, row.topic_id()).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn create_message(&self, params: CreateMessageParams) -> Result<MessageRecord, RepoError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (sender_id, receiver_id, title, content) \
             VALUES ($1, $2, $3, $4) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(params.sender_id)
        .bind(params.receiver_id)
        .bind(params.title)
        .bind(params.content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn mark_message_read(&self, id: i64) -> Result<bool, RepoError> {
        let previous = sqlx::query_as::<_, (bool,)>(
            "UPDATE messages m SET read = TRUE, \
             updated_at = CASE WHEN prev.read THEN m.updated_at ELSE now() END \
             FROM (SELECT id, read FROM messages WHERE id = $1 FOR UPDATE) prev \
             WHERE m.id = prev.id RETURNING prev.read",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match previous {
            Some((was_read,)) => Ok(!was_read),
            None => Err(RepoError::NotFound),
        }
    }

    async fn mark_messages_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "UPDATE messages SET read = TRUE, updated_at = now() \
             WHERE receiver_id = $1 AND read = FALSE RETURNING id",
        )
        .bind(receiver_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids_of(rows))
    }

    async fn delete_message(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (receiver_id, title, content) \
             VALUES ($1, $2, $3) RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(params.receiver_id)
        .bind(params.title)
        .bind(params.content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn mark_notification_read(&self, id: i64) -> Result<bool, RepoError> {
        let previous = sqlx::query_as::<_, (bool,)>(
            "UPDATE notifications n SET read = TRUE, \
             updated_at = CASE WHEN prev.read THEN n.updated_at ELSE now() END \
             FROM (SELECT id, read FROM notifications WHERE id = $1 FOR UPDATE) prev \
             WHERE n.id = prev.id RETURNING prev.read",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match previous {
            Some((was_read,)) => Ok(!was_read),
            None => Err(RepoError::NotFound),
        }
    }

    async fn mark_notifications_read(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "UPDATE notifications SET read = TRUE, updated_at = now() \
             WHERE receiver_id = $1 AND read = FALSE RETURNING id",
        )
        .bind(receiver_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids_of(rows))
    }

    async fn delete_notification(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_read_notifications(&self, receiver_id: i64) -> Result<Vec<i64>, RepoError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "DELETE FROM notifications WHERE receiver_id = $1 AND read = TRUE RETURNING id",
        )
        .bind(receiver_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids_of(rows))
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
             username = COALESCE($2, username), \
             password_hash = COALESCE($3, password_hash), \
             avatar = COALESCE($4, avatar), \
             signature = COALESCE($5, signature), \
             updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.username)
        .bind(params.password_hash)
        .bind(params.avatar)
        .bind(params.signature)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRecord::from).ok_or(RepoError::NotFound)
    }
}
