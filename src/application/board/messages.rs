use tracing::{info, instrument};

use crate::application::repos::CreateMessageParams;
use crate::cache::WriteEvent;
use crate::domain::entities::{MessageRecord, UserRecord};

use super::types::{TITLE_MAX_CHARS, ensure_max_chars, ensure_non_empty};
use super::{BoardError, BoardService, Inbox, Recipient, SendMessageCommand};

impl BoardService {
    async fn resolve_recipient(&self, recipient: &Recipient) -> Result<UserRecord, BoardError> {
        let user = match recipient {
            Recipient::Id(id) => self.cache.user(*id).await?,
            Recipient::Name(name) => self.reader.find_user_by_name(name.trim()).await?,
        };
        user.ok_or_else(|| BoardError::not_found("receiver"))
    }

    #[instrument(skip(self, command), fields(sender_id = command.sender_id))]
    pub async fn send_message(
        &self,
        command: SendMessageCommand,
    ) -> Result<MessageRecord, BoardError> {
        ensure_non_empty(&command.title, "title")?;
        ensure_max_chars(command.title.trim(), TITLE_MAX_CHARS, "title")?;
        ensure_non_empty(&command.content, "content")?;

        let sender = self.require_user(command.sender_id).await?;
        let receiver = self.resolve_recipient(&command.receiver).await?;
        if receiver.id == sender.id {
            return Err(BoardError::validation(
                "receiver",
                "messages must be sent to someone else",
            ));
        }

        let message = self
            .writer
            .create_message(CreateMessageParams {
                sender_id: sender.id,
                receiver_id: receiver.id,
                title: command.title.trim().to_string(),
                content: command.content,
            })
            .await?;

        self.cache
            .invalidate(&WriteEvent::MessageSent {
                message_id: message.id,
                sender_id: sender.id,
                receiver_id: receiver.id,
            })
            .await;

        info!(message_id = message.id, "message sent");
        Ok(message)
    }

    /// Open a message. Sender and receiver may view it; only the receiver's
    /// view marks it read.
    #[instrument(skip(self))]
    pub async fn read_message(
        &self,
        actor_id: i64,
        message_id: i64,
    ) -> Result<MessageRecord, BoardError> {
        let message = self
            .cache
            .message(message_id)
            .await?
            .ok_or_else(|| BoardError::not_found("message"))?;

        let is_receiver = message.receiver_id == actor_id;
        if !is_receiver && message.sender_id != actor_id {
            return Err(BoardError::forbidden("read this message"));
        }
        if !is_receiver || message.read {
            return Ok(message);
        }

        if self.writer.mark_message_read(message_id).await? {
            self.cache
                .invalidate(&WriteEvent::MessagesRead {
                    receiver_id: message.receiver_id,
                    message_ids: vec![message_id],
                })
                .await;
        }

        self.cache
            .message(message_id)
            .await?
            .ok_or_else(|| BoardError::not_found("message"))
    }

    /// Mark every unread message of `receiver_id` read, returning how many changed.
    #[instrument(skip(self))]
    pub async fn mark_all_messages_read(&self, receiver_id: i64) -> Result<usize, BoardError> {
        self.require_user(receiver_id).await?;
        let message_ids = self.writer.mark_messages_read(receiver_id).await?;
        let changed = message_ids.len();
        if changed > 0 {
            self.cache
                .invalidate(&WriteEvent::MessagesRead {
                    receiver_id,
                    message_ids,
                })
                .await;
        }
        Ok(changed)
    }

    /// Only the receiver may delete a message.
    #[instrument(skip(self))]
    pub async fn delete_message(&self, actor_id: i64, message_id: i64) -> Result<(), BoardError> {
        let message = self
            .cache
            .message(message_id)
            .await?
            .ok_or_else(|| BoardError::not_found("message"))?;
        if message.receiver_id != actor_id {
            return Err(BoardError::forbidden("delete this message"));
        }

        self.writer.delete_message(message_id).await?;
        self.cache
            .invalidate(&WriteEvent::MessageDeleted {
                message_id,
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
            })
            .await;
        Ok(())
    }

    pub async fn inbox(&self, user_id: i64) -> Result<Inbox, BoardError> {
        let (read, unread): (Vec<_>, Vec<_>) = self
            .cache
            .received_messages(user_id)
            .await?
            .into_iter()
            .partition(|message| message.read);
        Ok(Inbox { unread, read })
    }

    pub async fn sent_box(&self, user_id: i64) -> Result<Vec<MessageRecord>, BoardError> {
        Ok(self.cache.sent_messages(user_id).await?)
    }

    pub async fn unread_messages(&self, user_id: i64) -> Result<usize, BoardError> {
        let received = self.cache.received_messages(user_id).await?;
        Ok(received.iter().filter(|message| !message.read).count())
    }
}
