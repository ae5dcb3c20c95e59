use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::operations::progress;
use crate::db::{self, Database};
use crate::error::StudyError;

pub const DEFAULT_RECALL_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub user_id: String,
    pub subject_id: Option<String>,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub topic_id: String,
    pub front: String,
    pub back: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
    pub id: String,
    pub topic_id: String,
    pub user_id: String,
    pub archived: bool,
    pub reviewing: bool,
    pub recall_threshold: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial config update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub archived: Option<bool>,
    pub reviewing: Option<bool>,
    pub recall_threshold: Option<f64>,
}

pub async fn create_user(db: &Database, username: &str) -> Result<User, StudyError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(StudyError::validation("username must not be empty"));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        created_at: db::timestamp(Utc::now()),
    };

    sqlx::query(r#"INSERT INTO "users" ("id", "username", "createdAt") VALUES (?, ?, ?)"#)
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.created_at)
        .execute(db.pool())
        .await?;

    Ok(user)
}

pub async fn create_subject(
    db: &Database,
    user_id: &str,
    title: &str,
) -> Result<Subject, StudyError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StudyError::validation("subject title must not be empty"));
    }
    require_user(db.pool(), user_id).await?;

    let now = db::timestamp(Utc::now());
    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        archived: false,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO "subjects" ("id", "userId", "title", "archived", "createdAt", "updatedAt")
        VALUES (?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&subject.id)
    .bind(&subject.user_id)
    .bind(&subject.title)
    .bind(&subject.created_at)
    .bind(&subject.updated_at)
    .execute(db.pool())
    .await?;

    Ok(subject)
}

/// Creates a topic together with its owner's default config.
pub async fn create_topic(
    db: &Database,
    user_id: &str,
    title: &str,
    subject_id: Option<&str>,
) -> Result<Topic, StudyError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StudyError::validation("topic title must not be empty"));
    }
    require_user(db.pool(), user_id).await?;
    if let Some(subject_id) = subject_id {
        require_subject(db.pool(), subject_id).await?;
    }

    let now = db::timestamp(Utc::now());
    let topic = Topic {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        subject_id: subject_id.map(str::to_string),
        title: title.to_string(),
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    let mut tx = db.pool().begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "topics" ("id", "userId", "subjectId", "title", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&topic.id)
    .bind(&topic.user_id)
    .bind(&topic.subject_id)
    .bind(&topic.title)
    .bind(&topic.created_at)
    .bind(&topic.updated_at)
    .execute(&mut *tx)
    .await?;

    insert_config_if_absent(&mut tx, &topic.id, user_id, &now).await?;

    tx.commit().await?;

    tracing::debug!(topic = %topic.id, user = %user_id, "created topic");
    Ok(topic)
}

pub async fn get_topic(db: &Database, topic_id: &str) -> Result<Option<Topic>, StudyError> {
    let row = sqlx::query(r#"SELECT * FROM "topics" WHERE "id" = ? LIMIT 1"#)
        .bind(topic_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.map(|r| map_topic(&r)))
}

/// Destroys a topic and cascades to its cards, configs and every progress
/// record of those cards, in one transaction.
pub async fn delete_topic(db: &Database, topic_id: &str) -> Result<(), StudyError> {
    require_topic(db.pool(), topic_id).await?;

    let mut tx = db.pool().begin().await?;

    sqlx::query(
        r#"
        DELETE FROM "progress_records"
        WHERE "cardId" IN (SELECT "id" FROM "cards" WHERE "topicId" = ?)
        "#,
    )
    .bind(topic_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(r#"DELETE FROM "cards" WHERE "topicId" = ?"#)
        .bind(topic_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(r#"DELETE FROM "topic_configs" WHERE "topicId" = ?"#)
        .bind(topic_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(r#"DELETE FROM "topics" WHERE "id" = ?"#)
        .bind(topic_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(topic = %topic_id, "deleted topic with its cards and configs");
    Ok(())
}

/// Adds a card and starts progress tracking for every configured
/// collaborator of the topic.
pub async fn add_card(
    db: &Database,
    topic_id: &str,
    front: &str,
    back: &str,
) -> Result<Card, StudyError> {
    require_topic(db.pool(), topic_id).await?;
    let collaborators = config_user_ids(db.pool(), topic_id).await?;

    let now = Utc::now();
    let now_ts = db::timestamp(now);
    let card = Card {
        id: Uuid::new_v4().to_string(),
        topic_id: topic_id.to_string(),
        front: front.to_string(),
        back: back.to_string(),
        created_at: now_ts.clone(),
        updated_at: now_ts,
    };

    let mut tx = db.pool().begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "cards" ("id", "topicId", "front", "back", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&card.id)
    .bind(&card.topic_id)
    .bind(&card.front)
    .bind(&card.back)
    .bind(&card.created_at)
    .bind(&card.updated_at)
    .execute(&mut *tx)
    .await?;

    for user_id in &collaborators {
        progress::insert_if_absent(&mut tx, &card.id, user_id, now).await?;
    }

    tx.commit().await?;
    Ok(card)
}

/// Removes a card and every progress record tracking it.
pub async fn remove_card(db: &Database, card_id: &str) -> Result<(), StudyError> {
    let found: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "cards" WHERE "id" = ?"#)
        .bind(card_id)
        .fetch_optional(db.pool())
        .await?;
    if found.is_none() {
        return Err(StudyError::not_found(format!("card {card_id}")));
    }

    let mut tx = db.pool().begin().await?;

    sqlx::query(r#"DELETE FROM "progress_records" WHERE "cardId" = ?"#)
        .bind(card_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(r#"DELETE FROM "cards" WHERE "id" = ?"#)
        .bind(card_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn list_cards(db: &Database, topic_id: &str) -> Result<Vec<Card>, StudyError> {
    let rows = sqlx::query(
        r#"SELECT * FROM "cards" WHERE "topicId" = ? ORDER BY "createdAt" ASC, "id" ASC"#,
    )
    .bind(topic_id)
    .fetch_all(db.pool())
    .await?;
    Ok(rows.iter().map(map_card).collect())
}

pub async fn get_config(
    db: &Database,
    topic_id: &str,
    user_id: &str,
) -> Result<Option<TopicConfig>, StudyError> {
    let row = sqlx::query(
        r#"SELECT * FROM "topic_configs" WHERE "topicId" = ? AND "userId" = ? LIMIT 1"#,
    )
    .bind(topic_id)
    .bind(user_id)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.map(|r| map_config(&r)))
}

pub async fn update_config(
    db: &Database,
    topic_id: &str,
    user_id: &str,
    update: ConfigUpdate,
) -> Result<TopicConfig, StudyError> {
    if let Some(threshold) = update.recall_threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(StudyError::validation(format!(
                "recall threshold must be in (0, 1], got {threshold}"
            )));
        }
    }

    let current = get_config(db, topic_id, user_id).await?.ok_or_else(|| {
        StudyError::not_found(format!("config for topic {topic_id} and user {user_id}"))
    })?;

    let archived = update.archived.unwrap_or(current.archived);
    let reviewing = update.reviewing.unwrap_or(current.reviewing);
    let recall_threshold = update.recall_threshold.unwrap_or(current.recall_threshold);
    let updated_at = db::timestamp(Utc::now());

    sqlx::query(
        r#"
        UPDATE "topic_configs"
        SET "archived" = ?, "reviewing" = ?, "recallThreshold" = ?, "updatedAt" = ?
        WHERE "topicId" = ? AND "userId" = ?
        "#,
    )
    .bind(archived)
    .bind(reviewing)
    .bind(recall_threshold)
    .bind(&updated_at)
    .bind(topic_id)
    .bind(user_id)
    .execute(db.pool())
    .await?;

    Ok(TopicConfig {
        archived,
        reviewing,
        recall_threshold,
        updated_at,
        ..current
    })
}

/// Topics the user actively reviews: reviewing flag set, not archived.
/// Ordered by topic id so scheduling output is stable.
pub async fn reviewing_topics(db: &Database, user_id: &str) -> Result<Vec<Topic>, StudyError> {
    let rows = sqlx::query(
        r#"
        SELECT t.* FROM "topics" t
        JOIN "topic_configs" c ON c."topicId" = t."id"
        WHERE c."userId" = ? AND c."reviewing" = 1 AND c."archived" = 0
        ORDER BY t."id" ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db.pool())
    .await?;
    Ok(rows.iter().map(map_topic).collect())
}

pub(crate) async fn require_user(pool: &SqlitePool, user_id: &str) -> Result<(), StudyError> {
    let found: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if found.is_none() {
        return Err(StudyError::not_found(format!("user {user_id}")));
    }
    Ok(())
}

pub(crate) async fn require_subject(pool: &SqlitePool, subject_id: &str) -> Result<(), StudyError> {
    let found: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "subjects" WHERE "id" = ?"#)
        .bind(subject_id)
        .fetch_optional(pool)
        .await?;
    if found.is_none() {
        return Err(StudyError::not_found(format!("subject {subject_id}")));
    }
    Ok(())
}

pub(crate) async fn require_topic(pool: &SqlitePool, topic_id: &str) -> Result<Topic, StudyError> {
    let row = sqlx::query(r#"SELECT * FROM "topics" WHERE "id" = ? LIMIT 1"#)
        .bind(topic_id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| map_topic(&r))
        .ok_or_else(|| StudyError::not_found(format!("topic {topic_id}")))
}

pub(crate) async fn config_user_ids(
    pool: &SqlitePool,
    topic_id: &str,
) -> Result<Vec<String>, StudyError> {
    let ids: Vec<String> =
        sqlx::query_scalar(r#"SELECT "userId" FROM "topic_configs" WHERE "topicId" = ?"#)
            .bind(topic_id)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

pub(crate) async fn insert_config_if_absent(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: &str,
    user_id: &str,
    now: &str,
) -> Result<(), StudyError> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO "topic_configs"
          ("id", "topicId", "userId", "archived", "reviewing", "recallThreshold", "createdAt", "updatedAt")
        VALUES (?, ?, ?, 0, 0, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(topic_id)
    .bind(user_id)
    .bind(DEFAULT_RECALL_THRESHOLD)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn map_topic(row: &SqliteRow) -> Topic {
    Topic {
        id: row.get("id"),
        user_id: row.get("userId"),
        subject_id: row.get("subjectId"),
        title: row.get("title"),
        created_at: row.get("createdAt"),
        updated_at: row.get("updatedAt"),
    }
}

fn map_card(row: &SqliteRow) -> Card {
    Card {
        id: row.get("id"),
        topic_id: row.get("topicId"),
        front: row.get("front"),
        back: row.get("back"),
        created_at: row.get("createdAt"),
        updated_at: row.get("updatedAt"),
    }
}

fn map_config(row: &SqliteRow) -> TopicConfig {
    TopicConfig {
        id: row.get("id"),
        topic_id: row.get("topicId"),
        user_id: row.get("userId"),
        archived: row.get("archived"),
        reviewing: row.get("reviewing"),
        recall_threshold: row.get("recallThreshold"),
        created_at: row.get("createdAt"),
        updated_at: row.get("updatedAt"),
    }
}
