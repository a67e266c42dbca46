use tracing::{info, instrument};

use crate::application::repos::{RepoError, UpdateUserParams};
use crate::cache::WriteEvent;
use crate::domain::entities::{TopicRecord, UserRecord};

use super::types::{SIGNATURE_MAX_CHARS, USERNAME_MAX_CHARS, ensure_max_chars, ensure_non_empty};
use super::{BoardError, BoardService, ChangePasswordCommand, UpdateProfileCommand};

impl BoardService {
    pub async fn user(&self, user_id: i64) -> Result<UserRecord, BoardError> {
        self.require_user(user_id).await
    }

    /// The current hash must match before the new one is stored.
    #[instrument(skip(self, command), fields(user_id = command.user_id))]
    pub async fn change_password(&self, command: ChangePasswordCommand) -> Result<(), BoardError> {
        ensure_non_empty(&command.new_password_hash, "password")?;
        let user = self.require_user(command.user_id).await?;
        if user.password_hash != command.current_password_hash {
            return Err(BoardError::forbidden("change the password"));
        }

        self.write_user(UpdateUserParams {
            id: user.id,
            password_hash: Some(command.new_password_hash),
            ..UpdateUserParams::default()
        })
        .await?;
        info!("password changed");
        Ok(())
    }

    /// Update username and signature. A changed username must be free.
    #[instrument(skip(self, command), fields(user_id = command.user_id))]
    pub async fn update_profile(
        &self,
        command: UpdateProfileCommand,
    ) -> Result<UserRecord, BoardError> {
        let username = command.username.trim().to_string();
        ensure_non_empty(&username, "username")?;
        ensure_max_chars(&username, USERNAME_MAX_CHARS, "username")?;
        ensure_max_chars(&command.signature, SIGNATURE_MAX_CHARS, "signature")?;

        let user = self.require_user(command.user_id).await?;
        let username = if username == user.username {
            None
        } else {
            if self.reader.find_user_by_name(&username).await?.is_some() {
                return Err(BoardError::validation("username", "is already taken"));
            }
            Some(username)
        };

        self.write_user(UpdateUserParams {
            id: user.id,
            username,
            signature: Some(command.signature),
            ..UpdateUserParams::default()
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_avatar(&self, user_id: i64, avatar: &str) -> Result<UserRecord, BoardError> {
        ensure_non_empty(avatar, "avatar")?;
        self.require_user(user_id).await?;

        self.write_user(UpdateUserParams {
            id: user_id,
            avatar: Some(avatar.trim().to_string()),
            ..UpdateUserParams::default()
        })
        .await
    }

    pub async fn created_topics_of(&self, user_id: i64) -> Result<Vec<TopicRecord>, BoardError> {
        self.require_user(user_id).await?;
        Ok(self.cache.created_topics(user_id).await?)
    }

    pub async fn replied_topics_of(&self, user_id: i64) -> Result<Vec<TopicRecord>, BoardError> {
        self.require_user(user_id).await?;
        Ok(self.cache.replied_topics(user_id).await?)
    }

    async fn write_user(&self, params: UpdateUserParams) -> Result<UserRecord, BoardError> {
        let user_id = params.id;
        let user = self.writer.update_user(params).await.map_err(|err| match err {
            RepoError::Duplicate { .. } => BoardError::validation("username", "is already taken"),
            RepoError::NotFound => BoardError::not_found("user"),
            other => BoardError::Repo(other),
        })?;
        self.cache
            .invalidate(&WriteEvent::UserUpdated { user_id })
            .await;
        Ok(user)
    }
}
