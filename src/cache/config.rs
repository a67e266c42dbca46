//! Cache configuration.
//!
//! Key prefix and per-type expiry, loaded from the `[cache]` table.

use std::time::Duration;

use serde::Deserialize;

use super::keys::Relation;
use crate::domain::types::EntityKind;

// Default expiry in seconds; zero means the entry never expires.
const DEFAULT_USER_TTL_SECS: u64 = 0;
const DEFAULT_TOPIC_TTL_SECS: u64 = 300;
const DEFAULT_REPLY_TTL_SECS: u64 = 3600;
const DEFAULT_MESSAGE_TTL_SECS: u64 = 3600;
const DEFAULT_NOTIFICATION_TTL_SECS: u64 = 3600;
const DEFAULT_CREATED_TOPICS_TTL_SECS: u64 = 3600;
const DEFAULT_REPLIED_TOPICS_TTL_SECS: u64 = 1800;
const DEFAULT_REPLIES_TTL_SECS: u64 = 900;
const DEFAULT_RECEIVED_MESSAGES_TTL_SECS: u64 = 3600;
const DEFAULT_SENT_MESSAGES_TTL_SECS: u64 = 3600;
const DEFAULT_RECEIVED_NOTIFICATIONS_TTL_SECS: u64 = 3600;

/// Expiry per snapshot kind and per relation, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub user: u64,
    pub topic: u64,
    pub reply: u64,
    pub message: u64,
    pub notification: u64,
    pub created_topics: u64,
    pub replied_topics: u64,
    pub replies: u64,
    pub received_messages: u64,
    pub sent_messages: u64,
    pub received_notifications: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER_TTL_SECS,
            topic: DEFAULT_TOPIC_TTL_SECS,
            reply: DEFAULT_REPLY_TTL_SECS,
            message: DEFAULT_MESSAGE_TTL_SECS,
            notification: DEFAULT_NOTIFICATION_TTL_SECS,
            created_topics: DEFAULT_CREATED_TOPICS_TTL_SECS,
            replied_topics: DEFAULT_REPLIED_TOPICS_TTL_SECS,
            replies: DEFAULT_REPLIES_TTL_SECS,
            received_messages: DEFAULT_RECEIVED_MESSAGES_TTL_SECS,
            sent_messages: DEFAULT_SENT_MESSAGES_TTL_SECS,
            received_notifications: DEFAULT_RECEIVED_NOTIFICATIONS_TTL_SECS,
        }
    }
}

impl TtlConfig {
    fn entity_secs(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::User => self.user,
            EntityKind::Topic => self.topic,
            EntityKind::Reply => self.reply,
            EntityKind::Message => self.message,
            EntityKind::Notification => self.notification,
        }
    }

    fn relation_secs(&self, relation: Relation) -> u64 {
        match relation {
            Relation::CreatedTopics => self.created_topics,
            Relation::RepliedTopics => self.replied_topics,
            Relation::TopicReplies => self.replies,
            Relation::ReceivedMessages => self.received_messages,
            Relation::SentMessages => self.sent_messages,
            Relation::ReceivedNotifications => self.received_notifications,
        }
    }
}

/// Runtime cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Prepended to every rendered key.
    pub key_prefix: String,
    pub ttl: TtlConfig,
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            key_prefix: settings.key_prefix.clone(),
            ttl: settings.ttl.clone(),
        }
    }
}

impl CacheConfig {
    /// Snapshot expiry for `kind`; `None` means no expiry.
    pub fn entity_ttl(&self, kind: EntityKind) -> Option<Duration> {
        non_zero_secs(self.ttl.entity_secs(kind))
    }

    /// Index expiry for `relation`; `None` means no expiry.
    pub fn index_ttl(&self, relation: Relation) -> Option<Duration> {
        non_zero_secs(self.ttl.relation_secs(relation))
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = CacheConfig::default();
        assert_eq!(config.entity_ttl(EntityKind::User), None);
        assert_eq!(
            config.entity_ttl(EntityKind::Topic),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            config.entity_ttl(EntityKind::Reply),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            config.index_ttl(Relation::RepliedTopics),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            config.index_ttl(Relation::TopicReplies),
            Some(Duration::from_secs(900))
        );
        assert!(config.key_prefix.is_empty());
    }

    #[test]
    fn zero_disables_expiry() {
        let config = CacheConfig {
            ttl: TtlConfig {
                topic: 0,
                sent_messages: 0,
                ..TtlConfig::default()
            },
            ..CacheConfig::default()
        };
        assert_eq!(config.entity_ttl(EntityKind::Topic), None);
        assert_eq!(config.index_ttl(Relation::SentMessages), None);
    }
}
