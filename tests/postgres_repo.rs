//! Repository tests against a real Postgres database.
//!
//! - Each test gets a fresh database with `./migrations` applied.
//! - Marked `#[ignore]`; run with `DATABASE_URL` set and `--ignored`.

use std::collections::HashSet;
use std::sync::Arc;

use board::application::repos::{
    BoardWriteRepo, CreateMessageParams, CreateNotificationParams, CreateReplyParams,
    CreateTopicParams, EntityStore, MessageFilter, RepoError, UpdateUserParams,
};
use board::cache::{BoardCache, CacheConfig, KvStore, MemoryKv};
use board::infra::db::PostgresRepositories;
use sqlx::PgPool;

async fn insert_user(pool: &PgPool, username: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (username, password_hash, email) VALUES ($1, '', $2) RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .fetch_one(pool)
    .await
    .expect("insert user")
}

fn topic_params(author_id: i64, title: &str) -> CreateTopicParams {
    CreateTopicParams {
        title: title.to_string(),
        content: "body".to_string(),
        board_id: 1,
        author_id,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn relation_indexes_exist(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public'",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch indexes");
    let indexes: HashSet<String> = rows.into_iter().collect();

    for expected in [
        "topics_author_id_idx",
        "replies_topic_id_idx",
        "replies_author_id_idx",
        "messages_sender_id_idx",
        "messages_receiver_id_idx",
        "notifications_receiver_id_idx",
    ] {
        assert!(indexes.contains(expected), "missing {expected}");
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn replies_maintain_topic_activity(pool: PgPool) {
    let alice = insert_user(&pool, "alice").await;
    let bob = insert_user(&pool, "bob").await;
    let repos = PostgresRepositories::new(pool);

    let topic = repos.create_topic(topic_params(alice, "hello")).await.unwrap();
    let first = repos
        .create_reply(CreateReplyParams {
            topic_id: topic.id,
            author_id: bob,
            content: "first".to_string(),
        })
        .await
        .unwrap();
    let second = repos
        .create_reply(CreateReplyParams {
            topic_id: topic.id,
            author_id: alice,
            content: "second".to_string(),
        })
        .await
        .unwrap();

    let refreshed = repos.find_topic(topic.id).await.unwrap().unwrap();
    assert_eq!(refreshed.reply_count, 2);
    assert_eq!(refreshed.last_active_at, second.created_at);
    assert_eq!(refreshed.last_reply_author_id, Some(alice));

    repos.delete_reply(second.id).await.unwrap();
    let refreshed = repos.find_topic(topic.id).await.unwrap().unwrap();
    assert_eq!(refreshed.reply_count, 1);
    assert_eq!(refreshed.last_active_at, first.created_at);
    assert_eq!(refreshed.last_reply_author_id, Some(bob));

    let removed = repos.delete_topic(topic.id).await.unwrap();
    assert_eq!(removed, vec![first.id]);
    assert!(repos.find_reply(first.id).await.unwrap().is_none());
    assert!(matches!(
        repos.delete_topic(topic.id).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn read_markers_report_only_changed_rows(pool: PgPool) {
    let alice = insert_user(&pool, "alice").await;
    let bob = insert_user(&pool, "bob").await;
    let repos = PostgresRepositories::new(pool);

    let message = repos
        .create_message(CreateMessageParams {
            sender_id: alice,
            receiver_id: bob,
            title: "hi".to_string(),
            content: "there".to_string(),
        })
        .await
        .unwrap();
    repos
        .create_message(CreateMessageParams {
            sender_id: alice,
            receiver_id: bob,
            title: "again".to_string(),
            content: "there".to_string(),
        })
        .await
        .unwrap();

    assert!(repos.mark_message_read(message.id).await.unwrap());
    assert!(!repos.mark_message_read(message.id).await.unwrap());
    assert_eq!(repos.mark_messages_read(bob).await.unwrap().len(), 1);
    assert!(repos.mark_messages_read(bob).await.unwrap().is_empty());

    let unread = repos
        .list_messages(&MessageFilter {
            read: Some(false),
            ..MessageFilter::by_receiver(bob)
        })
        .await
        .unwrap();
    assert!(unread.is_empty());

    for title in ["one", "two"] {
        repos
            .create_notification(CreateNotificationParams {
                receiver_id: bob,
                title: title.to_string(),
                content: String::new(),
            })
            .await
            .unwrap();
    }
    assert_eq!(repos.mark_notifications_read(bob).await.unwrap().len(), 2);
    assert_eq!(repos.delete_read_notifications(bob).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn duplicate_usernames_are_rejected(pool: PgPool) {
    let alice = insert_user(&pool, "alice").await;
    insert_user(&pool, "bob").await;
    let repos = PostgresRepositories::new(pool);

    let err = repos
        .update_user(UpdateUserParams {
            id: alice,
            username: Some("bob".to_string()),
            ..UpdateUserParams::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Duplicate { .. }), "{err:?}");

    let updated = repos
        .update_user(UpdateUserParams {
            id: alice,
            signature: Some("hello".to_string()),
            ..UpdateUserParams::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.signature, "hello");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn cache_reads_through_postgres(pool: PgPool) {
    let alice = insert_user(&pool, "alice").await;
    let repos = Arc::new(PostgresRepositories::new(pool));
    let older = repos.create_topic(topic_params(alice, "older")).await.unwrap();
    let newer = repos.create_topic(topic_params(alice, "newer")).await.unwrap();

    let kv = Arc::new(MemoryKv::new());
    let cache = BoardCache::new(
        Arc::clone(&kv) as Arc<dyn KvStore>,
        Arc::clone(&repos) as Arc<dyn EntityStore>,
        CacheConfig::default(),
    );

    let created = cache.created_topics(alice).await.unwrap();
    assert_eq!(
        created.iter().map(|topic| topic.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );
    let cached = cache.topic(older.id).await.unwrap().unwrap();
    assert_eq!(cached, older);
    assert!(kv.contains(&format!("topic_id_{}.topic_info", older.id)));
}
