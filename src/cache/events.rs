//! Write events.
//!
//! Every mutation that can stale a cached entry is described by one
//! [`WriteEvent`], applied right after the write succeeds.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic epoch stamped on applied events for log correlation.
pub type Epoch = u64;

/// Mutations that require cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    // Replies
    /// A reply was added to a topic.
    ReplyCreated {
        topic_id: i64,
        reply_id: i64,
        author_id: i64,
    },
    /// A reply was removed from a topic.
    ReplyDeleted {
        topic_id: i64,
        reply_id: i64,
        author_id: i64,
    },

    // Topics
    /// A topic was created.
    TopicCreated { topic_id: i64, author_id: i64 },
    /// A topic and its replies were deleted.
    TopicDeleted {
        topic_id: i64,
        author_id: i64,
        reply_ids: Vec<i64>,
    },
    /// Title, content or board of a topic changed.
    TopicEdited { topic_id: i64 },
    /// The view counter of a topic was incremented.
    TopicViewed { topic_id: i64 },

    // Messages
    /// A private message was sent.
    MessageSent {
        message_id: i64,
        sender_id: i64,
        receiver_id: i64,
    },
    /// Messages of one receiver were marked read.
    MessagesRead {
        receiver_id: i64,
        message_ids: Vec<i64>,
    },
    /// A private message was deleted.
    MessageDeleted {
        message_id: i64,
        sender_id: i64,
        receiver_id: i64,
    },

    // Notifications
    /// Notifications were delivered to one or more receivers.
    NotificationsSent { receiver_ids: Vec<i64> },
    /// Notifications of one receiver were marked read.
    NotificationsRead {
        receiver_id: i64,
        notification_ids: Vec<i64>,
    },
    /// A notification was deleted.
    NotificationDeleted {
        notification_id: i64,
        receiver_id: i64,
    },
    /// Read notifications of one receiver were deleted in bulk.
    NotificationsSwept {
        receiver_id: i64,
        notification_ids: Vec<i64>,
    },

    // Users
    /// Password, profile or avatar of a user changed.
    UserUpdated { user_id: i64 },
}

impl WriteEvent {
    /// Stable operation name, used as a log field and metric label.
    pub fn name(&self) -> &'static str {
        match self {
            WriteEvent::ReplyCreated { .. } => "create_reply",
            WriteEvent::ReplyDeleted { .. } => "delete_reply",
            WriteEvent::TopicCreated { .. } => "create_topic",
            WriteEvent::TopicDeleted { .. } => "delete_topic",
            WriteEvent::TopicEdited { .. } => "edit_topic",
            WriteEvent::TopicViewed { .. } => "view_topic",
            WriteEvent::MessageSent { .. } => "send_message",
            WriteEvent::MessagesRead { .. } => "read_messages",
            WriteEvent::MessageDeleted { .. } => "delete_message",
            WriteEvent::NotificationsSent { .. } => "send_notifications",
            WriteEvent::NotificationsRead { .. } => "read_notifications",
            WriteEvent::NotificationDeleted { .. } => "delete_notification",
            WriteEvent::NotificationsSwept { .. } => "sweep_notifications",
            WriteEvent::UserUpdated { .. } => "update_user",
        }
    }
}

/// Hands out process-local epochs.
#[derive(Debug, Default)]
pub struct EpochCounter {
    next: AtomicU64,
}

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_epoch(&self) -> Epoch {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epochs_are_monotonic() {
        let counter = EpochCounter::new();
        let first = counter.next_epoch();
        let second = counter.next_epoch();
        assert!(second > first);
    }

    #[test]
    fn names_identify_the_operation() {
        let event = WriteEvent::ReplyCreated {
            topic_id: 1,
            reply_id: 2,
            author_id: 3,
        };
        assert_eq!(event.name(), "create_reply");
        assert_eq!(
            WriteEvent::UserUpdated { user_id: 1 }.name(),
            "update_user"
        );
    }
}
