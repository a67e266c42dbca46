use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::{
    application::repos::{
        EntityStore, MessageFilter, NotificationFilter, ReplyFilter, RepoError, TopicFilter,
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

/// `SELECT {columns} FROM {table} WHERE 1=1 ` ready for `AND` clauses.
fn select_from(columns: &str, table: &str) -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE 1=1 "))
}

fn push_eq<T>(qb: &mut QueryBuilder<'static, Postgres>, column: &str, value: Option<T>)
where
    T: 'static + Send + sqlx::Encode<'static, Postgres> + sqlx::Type<Postgres>,
{
    if let Some(value) = value {
        qb.push(format!("AND {column} = "));
        qb.push_bind(value);
        qb.push(" ");
    }
}

impl PostgresRepositories {
    async fn find_by_id<R>(&self, columns: &str, table: &str, id: i64) -> Result<Option<R>, RepoError>
    where
        R: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let mut qb = select_from(columns, table);
        push_eq(&mut qb, "id", Some(id));
        qb.build_query_as::<R>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl EntityStore for PostgresRepositories {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = self
            .find_by_id::<UserRow>(USER_COLUMNS, "users", id)
            .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        let row = self
            .find_by_id::<TopicRow>(TOPIC_COLUMNS, "topics", id)
            .await?;
        Ok(row.map(TopicRecord::from))
    }

    async fn find_reply(&self, id: i64) -> Result<Option<ReplyRecord>, RepoError> {
        let row = self
            .find_by_id::<ReplyRow>(REPLY_COLUMNS, "replies", id)
            .await?;
        Ok(row.map(ReplyRecord::from))
    }

    async fn find_message(&self, id: i64) -> Result<Option<MessageRecord>, RepoError> {
        let row = self
            .find_by_id::<MessageRow>(MESSAGE_COLUMNS, "messages", id)
            .await?;
        Ok(row.map(MessageRecord::from))
    }

    async fn find_notification(&self, id: i64) -> Result<Option<NotificationRecord>, RepoError> {
        let row = self
            .find_by_id::<NotificationRow>(NOTIFICATION_COLUMNS, "notifications", id)
            .await?;
        Ok(row.map(NotificationRecord::from))
    }

    async fn list_topics(&self, filter: &TopicFilter) -> Result<Vec<TopicRecord>, RepoError> {
        let mut qb = select_from(TOPIC_COLUMNS, "topics");
        push_eq(&mut qb, "author_id", filter.author_id);
        push_eq(&mut qb, "board_id", filter.board_id);

        let rows = qb
            .build_query_as::<TopicRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TopicRecord::from).collect())
    }

    async fn list_replies(&self, filter: &ReplyFilter) -> Result<Vec<ReplyRecord>, RepoError> {
        let mut qb = select_from(REPLY_COLUMNS, "replies");
        push_eq(&mut qb, "topic_id", filter.topic_id);
        push_eq(&mut qb, "author_id", filter.author_id);

        let rows = qb
            .build_query_as::<ReplyRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReplyRecord::from).collect())
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageRecord>, RepoError> {
        let mut qb = select_from(MESSAGE_COLUMNS, "messages");
        push_eq(&mut qb, "sender_id", filter.sender_id);
        push_eq(&mut qb, "receiver_id", filter.receiver_id);
        push_eq(&mut qb, "read", filter.read);

        let rows = qb
            .build_query_as::<MessageRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let mut qb = select_from(NOTIFICATION_COLUMNS, "notifications");
        push_eq(&mut qb, "receiver_id", filter.receiver_id);
        push_eq(&mut qb, "read", filter.read);

        let rows = qb
            .build_query_as::<NotificationRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(NotificationRecord::from).collect())
    }
}
