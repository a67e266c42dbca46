//! Cache key definitions.
//!
//! Snapshots live under `{entity}_id_{id}.{entity}_info` and ID-list indexes
//! under `{owner}_id_{owner_id}.{relation}`, optionally behind a prefix.

use std::fmt;
use std::str::FromStr;

use crate::domain::types::{EntityKind, UnknownName};

/// Sort direction used when an index is built from a store scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

/// Named one-to-many relations cached as ordered ID lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    /// Topics a user authored, keyed by user.
    CreatedTopics,
    /// Distinct topics a user replied in, keyed by user.
    RepliedTopics,
    /// Replies under a topic, keyed by topic.
    TopicReplies,
    /// Messages a user received, keyed by user.
    ReceivedMessages,
    /// Messages a user sent, keyed by user.
    SentMessages,
    /// Notifications a user received, keyed by user.
    ReceivedNotifications,
}

impl Relation {
    pub const ALL: [Relation; 6] = [
        Relation::CreatedTopics,
        Relation::RepliedTopics,
        Relation::TopicReplies,
        Relation::ReceivedMessages,
        Relation::SentMessages,
        Relation::ReceivedNotifications,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Relation::CreatedTopics => "created_topics",
            Relation::RepliedTopics => "replied_topics",
            Relation::TopicReplies => "replies",
            Relation::ReceivedMessages => "received_messages",
            Relation::SentMessages => "sent_messages",
            Relation::ReceivedNotifications => "received_notifications",
        }
    }

    /// Entity type of the owner ID in the key.
    pub fn owner(self) -> EntityKind {
        match self {
            Relation::TopicReplies => EntityKind::Topic,
            _ => EntityKind::User,
        }
    }

    /// Entity type of the IDs stored in the list.
    pub fn member(self) -> EntityKind {
        match self {
            Relation::CreatedTopics | Relation::RepliedTopics => EntityKind::Topic,
            Relation::TopicReplies => EntityKind::Reply,
            Relation::ReceivedMessages | Relation::SentMessages => EntityKind::Message,
            Relation::ReceivedNotifications => EntityKind::Notification,
        }
    }

    /// Build order. Replies read oldest first; everything else newest first.
    pub fn order(self) -> IndexOrder {
        match self {
            Relation::TopicReplies => IndexOrder::Ascending,
            _ => IndexOrder::Descending,
        }
    }

    /// Topic lists are re-sorted by `last_active_at` on every read, since
    /// replies move topics without touching the owner's index.
    pub fn resorts_on_read(self) -> bool {
        matches!(self, Relation::CreatedTopics | Relation::RepliedTopics)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relation {
    type Err = UnknownName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|relation| relation.name() == value)
            .ok_or_else(|| UnknownName::new("relation", value))
    }
}

/// Identifies one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheKey {
    /// Serialized snapshot of one entity.
    Entity { kind: EntityKind, id: i64 },
    /// Ordered ID list for one relation owner.
    Index { relation: Relation, owner_id: i64 },
}

impl CacheKey {
    pub fn entity(kind: EntityKind, id: i64) -> Self {
        Self::Entity { kind, id }
    }

    pub fn index(relation: Relation, owner_id: i64) -> Self {
        Self::Index { relation, owner_id }
    }

    /// Render the backend key, prepending `prefix` when it is non-empty.
    pub fn render(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.to_string()
        } else {
            format!("{prefix}{self}")
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Entity { kind, id } => write!(f, "{kind}_id_{id}.{kind}_info"),
            CacheKey::Index { relation, owner_id } => {
                write!(f, "{}_id_{owner_id}.{relation}", relation.owner())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keys_follow_entity_layout() {
        assert_eq!(
            CacheKey::entity(EntityKind::Topic, 7).to_string(),
            "topic_id_7.topic_info"
        );
        assert_eq!(
            CacheKey::entity(EntityKind::Notification, 12).to_string(),
            "notification_id_12.notification_info"
        );
    }

    #[test]
    fn index_keys_use_owner_kind() {
        assert_eq!(
            CacheKey::index(Relation::TopicReplies, 7).to_string(),
            "topic_id_7.replies"
        );
        assert_eq!(
            CacheKey::index(Relation::RepliedTopics, 3).to_string(),
            "user_id_3.replied_topics"
        );
        assert_eq!(
            CacheKey::index(Relation::ReceivedNotifications, 3).to_string(),
            "user_id_3.received_notifications"
        );
    }

    #[test]
    fn prefix_is_prepended_verbatim() {
        let key = CacheKey::entity(EntityKind::User, 1);
        assert_eq!(key.render(""), "user_id_1.user_info");
        assert_eq!(key.render("board:"), "board:user_id_1.user_info");
    }

    #[test]
    fn relation_names_round_trip() {
        for relation in Relation::ALL {
            assert_eq!(relation.name().parse::<Relation>(), Ok(relation));
        }
        assert!("topics".parse::<Relation>().is_err());
    }

    #[test]
    fn only_replies_are_ascending() {
        for relation in Relation::ALL {
            let expected = if relation == Relation::TopicReplies {
                IndexOrder::Ascending
            } else {
                IndexOrder::Descending
            };
            assert_eq!(relation.order(), expected, "{relation}");
        }
    }
}
