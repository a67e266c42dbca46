//! Snapshot codec.
//!
//! Entities are flattened into a map of scalar fields and stored as a JSON
//! object. Timestamps travel as integer Unix nanoseconds, optional integers
//! as `null`. Index entries are stored as a JSON array of IDs.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    MessageRecord, NotificationRecord, Record, ReplyRecord, TopicRecord, UserRecord,
};
use crate::domain::types::EntityKind;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed cache payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache payload is not a flat object")]
    NotAnObject,
    #[error("field `{field}` holds a nested value")]
    Nested { field: String },
    #[error("field `{field}` holds a non-integer number")]
    NonInteger { field: String },
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is outside the representable timestamp range")]
    Timestamp { field: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("field `{field}` cannot be expressed as i64 nanoseconds")]
    TimestampRange { field: &'static str },
}

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

/// A flat field map, the storage form of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    fn put_str(&mut self, field: &'static str, value: &str) {
        self.insert(field, FieldValue::Str(value.to_string()));
    }

    fn put_int(&mut self, field: &'static str, value: i64) {
        self.insert(field, FieldValue::Int(value));
    }

    fn put_bool(&mut self, field: &'static str, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn put_opt_int(&mut self, field: &'static str, value: Option<i64>) {
        let value = value.map_or(FieldValue::Null, FieldValue::Int);
        self.insert(field, value);
    }

    fn put_timestamp(
        &mut self,
        field: &'static str,
        value: OffsetDateTime,
    ) -> Result<(), EncodeError> {
        let nanos = i64::try_from(value.unix_timestamp_nanos())
            .map_err(|_| EncodeError::TimestampRange { field })?;
        self.put_int(field, nanos);
        Ok(())
    }

    fn field(&self, field: &'static str) -> Result<&FieldValue, DecodeError> {
        self.fields
            .get(field)
            .ok_or(DecodeError::MissingField { field })
    }

    pub fn str(&self, field: &'static str) -> Result<String, DecodeError> {
        match self.field(field)? {
            FieldValue::Str(value) => Ok(value.clone()),
            _ => Err(DecodeError::WrongType {
                field,
                expected: "a string",
            }),
        }
    }

    pub fn int(&self, field: &'static str) -> Result<i64, DecodeError> {
        match self.field(field)? {
            FieldValue::Int(value) => Ok(*value),
            _ => Err(DecodeError::WrongType {
                field,
                expected: "an integer",
            }),
        }
    }

    pub fn opt_int(&self, field: &'static str) -> Result<Option<i64>, DecodeError> {
        match self.field(field)? {
            FieldValue::Int(value) => Ok(Some(*value)),
            FieldValue::Null => Ok(None),
            _ => Err(DecodeError::WrongType {
                field,
                expected: "an integer or null",
            }),
        }
    }

    pub fn bool(&self, field: &'static str) -> Result<bool, DecodeError> {
        match self.field(field)? {
            FieldValue::Bool(value) => Ok(*value),
            _ => Err(DecodeError::WrongType {
                field,
                expected: "a boolean",
            }),
        }
    }

    pub fn timestamp(&self, field: &'static str) -> Result<OffsetDateTime, DecodeError> {
        let nanos = self.int(field)?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|_| DecodeError::Timestamp { field })
    }

    pub fn to_value(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::Str(text) => Value::String(text.clone()),
                    FieldValue::Int(number) => Value::Number(Number::from(*number)),
                    FieldValue::Bool(flag) => Value::Bool(*flag),
                    FieldValue::Null => Value::Null,
                };
                (name.clone(), value)
            })
            .collect::<Map<String, Value>>();
        Value::Object(map)
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let Value::Object(map) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };

        let mut record = Self::new();
        for (name, value) in map {
            let value = match value {
                Value::String(text) => FieldValue::Str(text),
                Value::Bool(flag) => FieldValue::Bool(flag),
                Value::Null => FieldValue::Null,
                Value::Number(number) => match number.as_i64() {
                    Some(int) => FieldValue::Int(int),
                    None => return Err(DecodeError::NonInteger { field: name }),
                },
                Value::Array(_) | Value::Object(_) => {
                    return Err(DecodeError::Nested { field: name });
                }
            };
            record.fields.insert(name, value);
        }
        Ok(record)
    }
}

/// An entity with a flat snapshot form.
pub trait Snapshot: Sized {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    fn encode(&self) -> Result<FlatRecord, EncodeError>;

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError>;
}

impl Snapshot for UserRecord {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Result<FlatRecord, EncodeError> {
        let mut record = FlatRecord::new();
        record.put_int("id", self.id);
        record.put_str("username", &self.username);
        record.put_str("password_hash", &self.password_hash);
        record.put_str("email", &self.email);
        record.put_str("avatar", &self.avatar);
        record.put_str("signature", &self.signature);
        record.put_timestamp("created_at", self.created_at)?;
        record.put_timestamp("updated_at", self.updated_at)?;
        Ok(record)
    }

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.int("id")?,
            username: record.str("username")?,
            password_hash: record.str("password_hash")?,
            email: record.str("email")?,
            avatar: record.str("avatar")?,
            signature: record.str("signature")?,
            created_at: record.timestamp("created_at")?,
            updated_at: record.timestamp("updated_at")?,
        })
    }
}

impl Snapshot for TopicRecord {
    const KIND: EntityKind = EntityKind::Topic;

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Result<FlatRecord, EncodeError> {
        let mut record = FlatRecord::new();
        record.put_int("id", self.id);
        record.put_str("title", &self.title);
        record.put_str("content", &self.content);
        record.put_int("board_id", self.board_id);
        record.put_int("author_id", self.author_id);
        record.put_int("views", self.views);
        record.put_int("reply_count", self.reply_count);
        record.put_timestamp("last_active_at", self.last_active_at)?;
        record.put_timestamp("last_edited_at", self.last_edited_at)?;
        record.put_opt_int("last_reply_author_id", self.last_reply_author_id);
        record.put_timestamp("created_at", self.created_at)?;
        record.put_timestamp("updated_at", self.updated_at)?;
        Ok(record)
    }

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.int("id")?,
            title: record.str("title")?,
            content: record.str("content")?,
            board_id: record.int("board_id")?,
            author_id: record.int("author_id")?,
            views: record.int("views")?,
            reply_count: record.int("reply_count")?,
            last_active_at: record.timestamp("last_active_at")?,
            last_edited_at: record.timestamp("last_edited_at")?,
            last_reply_author_id: record.opt_int("last_reply_author_id")?,
            created_at: record.timestamp("created_at")?,
            updated_at: record.timestamp("updated_at")?,
        })
    }
}

impl Snapshot for ReplyRecord {
    const KIND: EntityKind = EntityKind::Reply;

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Result<FlatRecord, EncodeError> {
        let mut record = FlatRecord::new();
        record.put_int("id", self.id);
        record.put_int("topic_id", self.topic_id);
        record.put_int("author_id", self.author_id);
        record.put_str("content", &self.content);
        record.put_timestamp("created_at", self.created_at)?;
        record.put_timestamp("updated_at", self.updated_at)?;
        Ok(record)
    }

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.int("id")?,
            topic_id: record.int("topic_id")?,
            author_id: record.int("author_id")?,
            content: record.str("content")?,
            created_at: record.timestamp("created_at")?,
            updated_at: record.timestamp("updated_at")?,
        })
    }
}

impl Snapshot for MessageRecord {
    const KIND: EntityKind = EntityKind::Message;

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Result<FlatRecord, EncodeError> {
        let mut record = FlatRecord::new();
        record.put_int("id", self.id);
        record.put_int("sender_id", self.sender_id);
        record.put_int("receiver_id", self.receiver_id);
        record.put_str("title", &self.title);
        record.put_str("content", &self.content);
        record.put_bool("read", self.read);
        record.put_timestamp("created_at", self.created_at)?;
        record.put_timestamp("updated_at", self.updated_at)?;
        Ok(record)
    }

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.int("id")?,
            sender_id: record.int("sender_id")?,
            receiver_id: record.int("receiver_id")?,
            title: record.str("title")?,
            content: record.str("content")?,
            read: record.bool("read")?,
            created_at: record.timestamp("created_at")?,
            updated_at: record.timestamp("updated_at")?,
        })
    }
}

impl Snapshot for NotificationRecord {
    const KIND: EntityKind = EntityKind::Notification;

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Result<FlatRecord, EncodeError> {
        let mut record = FlatRecord::new();
        record.put_int("id", self.id);
        record.put_int("receiver_id", self.receiver_id);
        record.put_str("title", &self.title);
        record.put_str("content", &self.content);
        record.put_bool("read", self.read);
        record.put_timestamp("created_at", self.created_at)?;
        record.put_timestamp("updated_at", self.updated_at)?;
        Ok(record)
    }

    fn decode(record: &FlatRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.int("id")?,
            receiver_id: record.int("receiver_id")?,
            title: record.str("title")?,
            content: record.str("content")?,
            read: record.bool("read")?,
            created_at: record.timestamp("created_at")?,
            updated_at: record.timestamp("updated_at")?,
        })
    }
}

impl Record {
    pub fn encode(&self) -> Result<FlatRecord, EncodeError> {
        match self {
            Record::User(user) => user.encode(),
            Record::Topic(topic) => topic.encode(),
            Record::Reply(reply) => reply.encode(),
            Record::Message(message) => message.encode(),
            Record::Notification(notification) => notification.encode(),
        }
    }
}

pub fn encode_ids(ids: &[i64]) -> String {
    Value::Array(ids.iter().map(|id| Value::from(*id)).collect()).to_string()
}

pub fn decode_ids(text: &str) -> Result<Vec<i64>, DecodeError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    const MAX_NANOS: i64 = i64::MAX;

    fn timestamp() -> impl Strategy<Value = OffsetDateTime> {
        (i64::MIN..=MAX_NANOS).prop_map(|nanos| {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
                .expect("i64 nanoseconds are always in range")
        })
    }

    prop_compose! {
        fn topic()(
            id in any::<i64>(),
            title in ".*",
            content in ".*",
            board_id in any::<i64>(),
            author_id in any::<i64>(),
            views in any::<i64>(),
            reply_count in any::<i64>(),
            last_active_at in timestamp(),
            last_edited_at in timestamp(),
            last_reply_author_id in proptest::option::of(any::<i64>()),
            created_at in timestamp(),
            updated_at in timestamp(),
        ) -> TopicRecord {
            TopicRecord {
                id, title, content, board_id, author_id, views, reply_count,
                last_active_at, last_edited_at, last_reply_author_id, created_at, updated_at,
            }
        }
    }

    prop_compose! {
        fn message()(
            id in any::<i64>(),
            sender_id in any::<i64>(),
            receiver_id in any::<i64>(),
            title in ".*",
            content in ".*",
            read in any::<bool>(),
            created_at in timestamp(),
            updated_at in timestamp(),
        ) -> MessageRecord {
            MessageRecord { id, sender_id, receiver_id, title, content, read, created_at, updated_at }
        }
    }

    proptest! {
        #[test]
        fn topic_snapshot_survives_storage(topic in topic()) {
            let json = topic.encode().expect("in-range timestamps").to_json();
            let decoded = TopicRecord::decode(&FlatRecord::from_json(&json).expect("valid json"))
                .expect("decodes");
            prop_assert_eq!(decoded, topic);
        }

        #[test]
        fn message_snapshot_survives_storage(message in message()) {
            let json = message.encode().expect("in-range timestamps").to_json();
            let decoded = MessageRecord::decode(&FlatRecord::from_json(&json).expect("valid json"))
                .expect("decodes");
            prop_assert_eq!(decoded, message);
        }
    }

    fn sample_user() -> UserRecord {
        UserRecord {
            id: 1,
            username: String::new(),
            password_hash: "hash".to_string(),
            email: String::new(),
            avatar: "/images/default_profile.jpg".to_string(),
            signature: String::new(),
            created_at: datetime!(2024-01-01 00:00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00:00 UTC),
        }
    }

    #[test]
    fn empty_strings_and_absent_ids_are_preserved() {
        let user = sample_user();
        let record = FlatRecord::from_json(&user.encode().unwrap().to_json()).unwrap();
        assert_eq!(UserRecord::decode(&record).unwrap(), user);

        let topic = TopicRecord {
            id: 0,
            title: String::new(),
            content: String::new(),
            board_id: 0,
            author_id: 0,
            views: 0,
            reply_count: 0,
            last_active_at: datetime!(1970-01-01 00:00:00 UTC),
            last_edited_at: datetime!(1970-01-01 00:00:00 UTC),
            last_reply_author_id: None,
            created_at: datetime!(1970-01-01 00:00:00 UTC),
            updated_at: datetime!(1970-01-01 00:00:00 UTC),
        };
        let encoded = topic.encode().unwrap();
        assert_eq!(encoded.get("last_reply_author_id"), Some(&FieldValue::Null));
        let record = FlatRecord::from_json(&encoded.to_json()).unwrap();
        assert_eq!(TopicRecord::decode(&record).unwrap(), topic);
    }

    #[test]
    fn timestamps_beyond_i64_nanoseconds_refuse_to_encode() {
        let mut user = sample_user();
        user.updated_at = datetime!(2300-01-01 00:00:00 UTC);
        assert_eq!(
            user.encode(),
            Err(EncodeError::TimestampRange {
                field: "updated_at"
            })
        );
    }

    #[test]
    fn timestamps_are_integer_nanoseconds() {
        let record = sample_user().encode().unwrap();
        assert_eq!(
            record.get("created_at"),
            Some(&FieldValue::Int(1_704_067_200_000_000_000))
        );
    }

    #[test]
    fn missing_field_is_reported() {
        let mut record = sample_user().encode().unwrap();
        record.fields.remove("email");
        assert!(matches!(
            UserRecord::decode(&record),
            Err(DecodeError::MissingField { field: "email" })
        ));
    }

    #[test]
    fn wrong_field_type_is_reported() {
        let mut record = sample_user().encode().unwrap();
        record.insert("id", FieldValue::Str("1".to_string()));
        assert!(matches!(
            UserRecord::decode(&record),
            Err(DecodeError::WrongType { field: "id", .. })
        ));
    }

    #[test]
    fn corrupt_payloads_are_rejected() {
        assert!(matches!(
            FlatRecord::from_json("{not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            FlatRecord::from_json("[1,2]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            FlatRecord::from_json(r#"{"id": {"nested": 1}}"#),
            Err(DecodeError::Nested { .. })
        ));
        assert!(matches!(
            FlatRecord::from_json(r#"{"id": 1.5}"#),
            Err(DecodeError::NonInteger { .. })
        ));
    }

    #[test]
    fn id_lists_keep_their_order() {
        let text = encode_ids(&[5, 3, 9]);
        assert_eq!(text, "[5,3,9]");
        assert_eq!(decode_ids(&text).unwrap(), vec![5, 3, 9]);
        assert_eq!(decode_ids("[]").unwrap(), Vec::<i64>::new());
        assert!(decode_ids(r#"{"a":1}"#).is_err());
    }
}
