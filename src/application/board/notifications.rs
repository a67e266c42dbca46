use tracing::{info, instrument};

use crate::cache::WriteEvent;
use crate::domain::entities::NotificationRecord;

use super::{BoardError, BoardService, NotificationBox};

impl BoardService {
    pub async fn notifications(&self, user_id: i64) -> Result<NotificationBox, BoardError> {
        let (read, unread): (Vec<_>, Vec<_>) = self
            .cache
            .received_notifications(user_id)
            .await?
            .into_iter()
            .partition(|notification| notification.read);
        Ok(NotificationBox { unread, read })
    }

    pub async fn unread_notifications(&self, user_id: i64) -> Result<usize, BoardError> {
        let received = self.cache.received_notifications(user_id).await?;
        Ok(received
            .iter()
            .filter(|notification| !notification.read)
            .count())
    }

    /// Open a notification, marking it read. Only its receiver may open it.
    #[instrument(skip(self))]
    pub async fn read_notification(
        &self,
        actor_id: i64,
        notification_id: i64,
    ) -> Result<NotificationRecord, BoardError> {
        let notification = self
            .cache
            .notification(notification_id)
            .await?
            .ok_or_else(|| BoardError::not_found("notification"))?;
        if notification.receiver_id != actor_id {
            return Err(BoardError::forbidden("read this notification"));
        }
        if notification.read {
            return Ok(notification);
        }

        if self.writer.mark_notification_read(notification_id).await? {
            self.cache
                .invalidate(&WriteEvent::NotificationsRead {
                    receiver_id: actor_id,
                    notification_ids: vec![notification_id],
                })
                .await;
        }

        self.cache
            .notification(notification_id)
            .await?
            .ok_or_else(|| BoardError::not_found("notification"))
    }

    #[instrument(skip(self))]
    pub async fn mark_all_notifications_read(&self, receiver_id: i64) -> Result<usize, BoardError> {
        self.require_user(receiver_id).await?;
        let notification_ids = self.writer.mark_notifications_read(receiver_id).await?;
        let changed = notification_ids.len();
        if changed > 0 {
            self.cache
                .invalidate(&WriteEvent::NotificationsRead {
                    receiver_id,
                    notification_ids,
                })
                .await;
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub async fn delete_notification(
        &self,
        actor_id: i64,
        notification_id: i64,
    ) -> Result<(), BoardError> {
        let notification = self
            .cache
            .notification(notification_id)
            .await?
            .ok_or_else(|| BoardError::not_found("notification"))?;
        if notification.receiver_id != actor_id {
            return Err(BoardError::forbidden("delete this notification"));
        }

        self.writer.delete_notification(notification_id).await?;
        self.cache
            .invalidate(&WriteEvent::NotificationDeleted {
                notification_id,
                receiver_id: actor_id,
            })
            .await;
        Ok(())
    }

    /// Delete every read notification of `receiver_id`, returning how many were removed.
    #[instrument(skip(self))]
    pub async fn sweep_notifications(&self, receiver_id: i64) -> Result<usize, BoardError> {
        self.require_user(receiver_id).await?;
        let notification_ids = self.writer.delete_read_notifications(receiver_id).await?;
        let swept = notification_ids.len();
        if swept > 0 {
            self.cache
                .invalidate(&WriteEvent::NotificationsSwept {
                    receiver_id,
                    notification_ids,
                })
                .await;
            info!(receiver_id, swept, "read notifications swept");
        }
        Ok(swept)
    }
}
