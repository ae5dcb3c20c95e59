#![allow(dead_code)]

use std::sync::Once;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use kartei_engine::db::operations::catalog::{self, Card, ConfigUpdate, Topic, User};
use kartei_engine::db::Database;

static TRACING: Once = Once::new();

pub async fn open_test_db() -> (TempDir, Database) {
    TRACING.call_once(|| {
        let _ = kartei_engine::logging::init_tracing("info");
    });

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db = Database::open(&temp_dir.path().join("test.db"))
        .await
        .expect("failed to open test database");
    (temp_dir, db)
}

pub async fn user(db: &Database, name: &str) -> User {
    catalog::create_user(db, name).await.expect("create user")
}

/// Creates a topic with `count` cards, owned by `user_id`, flipped to
/// reviewing so it participates in scheduling.
pub async fn reviewing_topic(
    db: &Database,
    user_id: &str,
    title: &str,
    count: usize,
) -> (Topic, Vec<Card>) {
    let topic = catalog::create_topic(db, user_id, title, None)
        .await
        .expect("create topic");

    let mut cards = Vec::with_capacity(count);
    for i in 0..count {
        let card = catalog::add_card(db, &topic.id, &format!("front {i}"), &format!("back {i}"))
            .await
            .expect("add card");
        cards.push(card);
    }

    catalog::update_config(
        db,
        &topic.id,
        user_id,
        ConfigUpdate {
            reviewing: Some(true),
            ..Default::default()
        },
    )
    .await
    .expect("update config");

    (topic, cards)
}

/// Rewrites a progress record's schedule directly, bypassing the answer
/// policy, to set up due-date scenarios.
pub async fn set_due(
    db: &Database,
    card_id: &str,
    user_id: &str,
    due_at: DateTime<Utc>,
    level: i64,
) {
    sqlx::query(
        r#"UPDATE "progress_records" SET "dueAt" = ?, "level" = ? WHERE "cardId" = ? AND "userId" = ?"#,
    )
    .bind(kartei_engine::db::timestamp(due_at))
    .bind(level)
    .bind(card_id)
    .bind(user_id)
    .execute(db.pool())
    .await
    .expect("set due date");
}

pub async fn config_count(db: &Database, topic_id: &str, user_id: &str) -> i64 {
    sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "topic_configs" WHERE "topicId" = ? AND "userId" = ?"#,
    )
    .bind(topic_id)
    .bind(user_id)
    .fetch_one(db.pool())
    .await
    .expect("count configs")
}
