use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db;
use crate::error::StudyError;

pub const INITIAL_LEVEL: i64 = 1;

/// Study state for one (card, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: String,
    pub card_id: String,
    pub user_id: String,
    pub level: i64,
    pub due_at: DateTime<Utc>,
    pub answer_time_ms: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Progress row joined with its card's topic, as the scheduler consumes it.
#[derive(Debug, Clone)]
pub struct DueProgress {
    pub card_id: String,
    pub topic_id: String,
    pub level: i64,
    pub due_at: DateTime<Utc>,
    pub answer_time_ms: i64,
}

/// Creates the record with starting defaults unless one already exists for
/// the (card, user) pair. Retried multi-record mutations rely on this being
/// a no-op on conflict.
pub async fn insert_if_absent(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: &str,
    user_id: &str,
    due_at: DateTime<Utc>,
) -> Result<(), StudyError> {
    let now = db::timestamp(Utc::now());
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO "progress_records"
          ("id", "cardId", "userId", "level", "dueAt", "answerTimeMs", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(card_id)
    .bind(user_id)
    .bind(INITIAL_LEVEL)
    .bind(db::timestamp(due_at))
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get(
    pool: &SqlitePool,
    card_id: &str,
    user_id: &str,
) -> Result<Option<ProgressRecord>, StudyError> {
    let row = sqlx::query(
        r#"SELECT * FROM "progress_records" WHERE "cardId" = ? AND "userId" = ? LIMIT 1"#,
    )
    .bind(card_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(|r| map_record(&r)).transpose()
}

pub async fn list_for_topic(
    pool: &SqlitePool,
    topic_id: &str,
    user_id: &str,
) -> Result<Vec<ProgressRecord>, StudyError> {
    let rows = sqlx::query(
        r#"
        SELECT p.* FROM "progress_records" p
        JOIN "cards" c ON c."id" = p."cardId"
        WHERE p."userId" = ? AND c."topicId" = ?
        ORDER BY p."cardId" ASC
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_record).collect()
}

/// All due records for the user at `instant` (inclusive), restricted to
/// topics the user actively reviews, ordered by due date then card id.
pub async fn due_at_or_before(
    pool: &SqlitePool,
    user_id: &str,
    instant: DateTime<Utc>,
) -> Result<Vec<DueProgress>, StudyError> {
    let rows = sqlx::query(
        r#"
        SELECT p."cardId", c."topicId", p."level", p."dueAt", p."answerTimeMs"
        FROM "progress_records" p
        JOIN "cards" c ON c."id" = p."cardId"
        JOIN "topic_configs" tc ON tc."topicId" = c."topicId" AND tc."userId" = p."userId"
        WHERE p."userId" = ? AND p."dueAt" <= ?
          AND tc."reviewing" = 1 AND tc."archived" = 0
        ORDER BY p."dueAt" ASC, p."cardId" ASC
        "#,
    )
    .bind(user_id)
    .bind(db::timestamp(instant))
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_due).collect()
}

/// Records due strictly before `cutoff` whose card belongs to one of
/// `topic_ids`.
pub async fn due_in_topics_before(
    pool: &SqlitePool,
    user_id: &str,
    topic_ids: &[String],
    cutoff: DateTime<Utc>,
) -> Result<Vec<DueProgress>, StudyError> {
    due_in_topics(pool, user_id, topic_ids, None, cutoff).await
}

/// Records due within the half-open window [`start`, `end`) whose card
/// belongs to one of `topic_ids`.
pub async fn due_in_topics_within(
    pool: &SqlitePool,
    user_id: &str,
    topic_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<DueProgress>, StudyError> {
    due_in_topics(pool, user_id, topic_ids, Some(start), end).await
}

async fn due_in_topics(
    pool: &SqlitePool,
    user_id: &str,
    topic_ids: &[String],
    lower: Option<DateTime<Utc>>,
    upper: DateTime<Utc>,
) -> Result<Vec<DueProgress>, StudyError> {
    if topic_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"SELECT p."cardId", c."topicId", p."level", p."dueAt", p."answerTimeMs"
        FROM "progress_records" p
        JOIN "cards" c ON c."id" = p."cardId"
        WHERE p."userId" = "#,
    );
    qb.push_bind(user_id);
    if let Some(lower) = lower {
        qb.push(r#" AND p."dueAt" >= "#);
        qb.push_bind(db::timestamp(lower));
    }
    qb.push(r#" AND p."dueAt" < "#);
    qb.push_bind(db::timestamp(upper));
    qb.push(r#" AND c."topicId" IN ("#);
    {
        let mut sep = qb.separated(", ");
        for id in topic_ids {
            sep.push_bind(id);
        }
    }
    qb.push(r#") ORDER BY p."dueAt" ASC, p."cardId" ASC"#);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(map_due).collect()
}

pub async fn update_after_answer(
    pool: &SqlitePool,
    card_id: &str,
    user_id: &str,
    level: i64,
    due_at: DateTime<Utc>,
    answer_time_ms: i64,
) -> Result<u64, StudyError> {
    let result = sqlx::query(
        r#"
        UPDATE "progress_records"
        SET "level" = ?, "dueAt" = ?, "answerTimeMs" = ?, "updatedAt" = ?
        WHERE "cardId" = ? AND "userId" = ?
        "#,
    )
    .bind(level)
    .bind(db::timestamp(due_at))
    .bind(answer_time_ms)
    .bind(db::timestamp(Utc::now()))
    .bind(card_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Resets every record of `user_id` within the topic to level 1 and the
/// given due date. Returns the number of records touched.
pub async fn reset_for_topic(
    pool: &SqlitePool,
    topic_id: &str,
    user_id: &str,
    due_at: DateTime<Utc>,
) -> Result<u64, StudyError> {
    let result = sqlx::query(
        r#"
        UPDATE "progress_records"
        SET "level" = ?, "dueAt" = ?, "updatedAt" = ?
        WHERE "userId" = ?
          AND "cardId" IN (SELECT "id" FROM "cards" WHERE "topicId" = ?)
        "#,
    )
    .bind(INITIAL_LEVEL)
    .bind(db::timestamp(due_at))
    .bind(db::timestamp(Utc::now()))
    .bind(user_id)
    .bind(topic_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes every record of `user_id` within the topic. Unconditional, so a
/// retried removal converges to the same end state.
pub async fn delete_for_topic(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: &str,
    user_id: &str,
) -> Result<u64, StudyError> {
    let result = sqlx::query(
        r#"
        DELETE FROM "progress_records"
        WHERE "userId" = ?
          AND "cardId" IN (SELECT "id" FROM "cards" WHERE "topicId" = ?)
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

fn map_record(row: &SqliteRow) -> Result<ProgressRecord, StudyError> {
    Ok(ProgressRecord {
        id: row.get("id"),
        card_id: row.get("cardId"),
        user_id: row.get("userId"),
        level: row.get("level"),
        due_at: decode_due_at(row)?,
        answer_time_ms: row.get("answerTimeMs"),
        created_at: row.get("createdAt"),
        updated_at: row.get("updatedAt"),
    })
}

fn map_due(row: &SqliteRow) -> Result<DueProgress, StudyError> {
    Ok(DueProgress {
        card_id: row.get("cardId"),
        topic_id: row.get("topicId"),
        level: row.get("level"),
        due_at: decode_due_at(row)?,
        answer_time_ms: row.get("answerTimeMs"),
    })
}

fn decode_due_at(row: &SqliteRow) -> Result<DateTime<Utc>, StudyError> {
    let raw: String = row.get("dueAt");
    db::parse_timestamp(&raw).ok_or_else(|| {
        StudyError::Sql(sqlx::Error::Decode(
            format!("invalid dueAt timestamp: {raw}").into(),
        ))
    })
}
