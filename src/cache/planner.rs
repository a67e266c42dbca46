//! Eviction plan generation.
//!
//! Maps write events to the exact set of cache keys they can stale.

use std::collections::BTreeSet;
use std::fmt;

use super::events::WriteEvent;
use super::keys::{CacheKey, Relation};
use crate::domain::types::EntityKind;

/// Deduplicated keys to delete for one or more write events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    keys: BTreeSet<CacheKey>,
}

impl fmt::Display for EvictionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (entities, indexes) = self.counts();
        write!(f, "EvictionPlan {{ entities: {entities}, indexes: {indexes} }}")
    }
}

impl EvictionPlan {
    pub fn from_event(event: &WriteEvent) -> Self {
        let mut plan = Self::default();
        plan.add(event);
        plan
    }

    /// Merge several events into one plan.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a WriteEvent>) -> Self {
        let mut plan = Self::default();
        for event in events {
            plan.add(event);
        }
        plan
    }

    fn entity(&mut self, kind: EntityKind, id: i64) {
        self.keys.insert(CacheKey::entity(kind, id));
    }

    fn index(&mut self, relation: Relation, owner_id: i64) {
        self.keys.insert(CacheKey::index(relation, owner_id));
    }

    fn add(&mut self, event: &WriteEvent) {
        match event {
            WriteEvent::ReplyCreated {
                topic_id,
                author_id,
                ..
            } => {
                self.entity(EntityKind::Topic, *topic_id);
                self.index(Relation::TopicReplies, *topic_id);
                self.index(Relation::RepliedTopics, *author_id);
            }
            WriteEvent::ReplyDeleted {
                topic_id,
                reply_id,
                author_id,
            } => {
                self.entity(EntityKind::Topic, *topic_id);
                self.entity(EntityKind::Reply, *reply_id);
                self.index(Relation::TopicReplies, *topic_id);
                self.index(Relation::RepliedTopics, *author_id);
            }
            WriteEvent::TopicCreated { author_id, .. } => {
                self.index(Relation::CreatedTopics, *author_id);
            }
            WriteEvent::TopicDeleted {
                topic_id,
                author_id,
                reply_ids,
            } => {
                self.entity(EntityKind::Topic, *topic_id);
                for reply_id in reply_ids {
                    self.entity(EntityKind::Reply, *reply_id);
                }
                self.index(Relation::TopicReplies, *topic_id);
                self.index(Relation::CreatedTopics, *author_id);
            }
            WriteEvent::TopicEdited { topic_id } | WriteEvent::TopicViewed { topic_id } => {
                self.entity(EntityKind::Topic, *topic_id);
            }
            WriteEvent::MessageSent {
                sender_id,
                receiver_id,
                ..
            } => {
                self.index(Relation::SentMessages, *sender_id);
                self.index(Relation::ReceivedMessages, *receiver_id);
            }
            WriteEvent::MessagesRead { message_ids, .. } => {
                for message_id in message_ids {
                    self.entity(EntityKind::Message, *message_id);
                }
            }
            WriteEvent::MessageDeleted {
                message_id,
                sender_id,
                receiver_id,
            } => {
                self.entity(EntityKind::Message, *message_id);
                self.index(Relation::SentMessages, *sender_id);
                self.index(Relation::ReceivedMessages, *receiver_id);
            }
            WriteEvent::NotificationsSent { receiver_ids } => {
                for receiver_id in receiver_ids {
                    self.index(Relation::ReceivedNotifications, *receiver_id);
                }
            }
            WriteEvent::NotificationsRead {
                notification_ids, ..
            } => {
                for notification_id in notification_ids {
                    self.entity(EntityKind::Notification, *notification_id);
                }
            }
            WriteEvent::NotificationDeleted {
                notification_id,
                receiver_id,
            } => {
                self.entity(EntityKind::Notification, *notification_id);
                self.index(Relation::ReceivedNotifications, *receiver_id);
            }
            WriteEvent::NotificationsSwept {
                receiver_id,
                notification_ids,
            } => {
                for notification_id in notification_ids {
                    self.entity(EntityKind::Notification, *notification_id);
                }
                self.index(Relation::ReceivedNotifications, *receiver_id);
            }
            WriteEvent::UserUpdated { user_id } => {
                self.entity(EntityKind::User, *user_id);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.keys.iter()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of snapshot keys and index keys in the plan.
    pub fn counts(&self) -> (usize, usize) {
        self.keys.iter().fold((0, 0), |(e, i), key| match key {
            CacheKey::Entity { .. } => (e + 1, i),
            CacheKey::Index { .. } => (e, i + 1),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Backend keys, with `prefix` applied.
    pub fn render(&self, prefix: &str) -> Vec<String> {
        self.keys.iter().map(|key| key.render(prefix)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(event: WriteEvent) -> Vec<String> {
        EvictionPlan::from_event(&event).render("")
    }

    #[test]
    fn reply_created_busts_topic_and_both_indexes() {
        let keys = rendered(WriteEvent::ReplyCreated {
            topic_id: 7,
            reply_id: 70,
            author_id: 3,
        });
        assert_eq!(
            keys,
            vec![
                "topic_id_7.topic_info",
                "user_id_3.replied_topics",
                "topic_id_7.replies",
            ]
        );
    }

    #[test]
    fn reply_deleted_also_busts_reply_snapshot() {
        let plan = EvictionPlan::from_event(&WriteEvent::ReplyDeleted {
            topic_id: 7,
            reply_id: 70,
            author_id: 3,
        });
        assert_eq!(plan.len(), 4);
        assert!(plan.contains(&CacheKey::entity(EntityKind::Reply, 70)));
        assert!(plan.contains(&CacheKey::index(Relation::RepliedTopics, 3)));
    }

    #[test]
    fn topic_created_only_touches_author_index() {
        let keys = rendered(WriteEvent::TopicCreated {
            topic_id: 7,
            author_id: 3,
        });
        assert_eq!(keys, vec!["user_id_3.created_topics"]);
    }

    #[test]
    fn topic_deleted_busts_every_reply() {
        let plan = EvictionPlan::from_event(&WriteEvent::TopicDeleted {
            topic_id: 7,
            author_id: 3,
            reply_ids: vec![70, 71],
        });
        assert_eq!(plan.len(), 5);
        assert!(plan.contains(&CacheKey::entity(EntityKind::Reply, 71)));
        assert!(plan.contains(&CacheKey::index(Relation::CreatedTopics, 3)));
        assert!(plan.contains(&CacheKey::index(Relation::TopicReplies, 7)));
    }

    #[test]
    fn edits_and_views_only_bust_topic_snapshot() {
        for event in [
            WriteEvent::TopicEdited { topic_id: 7 },
            WriteEvent::TopicViewed { topic_id: 7 },
        ] {
            assert_eq!(rendered(event), vec!["topic_id_7.topic_info"]);
        }
    }

    #[test]
    fn message_sent_busts_both_mailboxes() {
        let keys = rendered(WriteEvent::MessageSent {
            message_id: 1,
            sender_id: 2,
            receiver_id: 3,
        });
        assert_eq!(
            keys,
            vec!["user_id_3.received_messages", "user_id_2.sent_messages"]
        );
    }

    #[test]
    fn read_markers_bust_only_snapshots() {
        let plan = EvictionPlan::from_event(&WriteEvent::MessagesRead {
            receiver_id: 3,
            message_ids: vec![1, 2],
        });
        assert!(plan.keys().all(|key| matches!(key, CacheKey::Entity { .. })));
        assert_eq!(plan.len(), 2);

        let plan = EvictionPlan::from_event(&WriteEvent::NotificationsRead {
            receiver_id: 3,
            notification_ids: vec![4],
        });
        assert_eq!(plan.render(""), vec!["notification_id_4.notification_info"]);
    }

    #[test]
    fn message_deleted_busts_snapshot_and_mailboxes() {
        let plan = EvictionPlan::from_event(&WriteEvent::MessageDeleted {
            message_id: 1,
            sender_id: 2,
            receiver_id: 3,
        });
        assert_eq!(plan.len(), 3);
        assert!(plan.contains(&CacheKey::entity(EntityKind::Message, 1)));
    }

    #[test]
    fn notification_removals_bust_receiver_index() {
        let plan = EvictionPlan::from_event(&WriteEvent::NotificationDeleted {
            notification_id: 4,
            receiver_id: 3,
        });
        assert_eq!(
            plan.render(""),
            vec![
                "notification_id_4.notification_info",
                "user_id_3.received_notifications",
            ]
        );

        let plan = EvictionPlan::from_event(&WriteEvent::NotificationsSwept {
            receiver_id: 3,
            notification_ids: vec![4, 5],
        });
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn notifications_sent_busts_each_receiver() {
        let plan = EvictionPlan::from_event(&WriteEvent::NotificationsSent {
            receiver_ids: vec![3, 4, 3],
        });
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn user_updated_busts_user_snapshot() {
        assert_eq!(
            rendered(WriteEvent::UserUpdated { user_id: 9 }),
            vec!["user_id_9.user_info"]
        );
    }

    #[test]
    fn merged_events_are_deduplicated() {
        let events = [
            WriteEvent::TopicViewed { topic_id: 7 },
            WriteEvent::TopicEdited { topic_id: 7 },
            WriteEvent::ReplyCreated {
                topic_id: 7,
                reply_id: 1,
                author_id: 3,
            },
        ];
        let plan = EvictionPlan::from_events(&events);
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.to_string(),
            "EvictionPlan { entities: 1, indexes: 2 }"
        );
    }
}
