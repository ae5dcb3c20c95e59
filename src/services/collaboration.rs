use chrono::Utc;
use uuid::Uuid;

use crate::db::operations::catalog::{self, Topic};
use crate::db::operations::progress;
use crate::db::{self, Database};
use crate::error::StudyError;
use crate::services::projector::ReviewProjector;

/// Copies `topic_id` wholesale for `recipient_id`: a new topic with the same
/// title, deep-copied cards, a fresh default config and level-1 progress on
/// every copy. The source topic and every collaborator's progress on it are
/// left untouched; the two topics evolve independently afterwards.
pub async fn share(
    db: &Database,
    topic_id: &str,
    recipient_id: &str,
    subject_id: Option<&str>,
) -> Result<Topic, StudyError> {
    let source = catalog::require_topic(db.pool(), topic_id).await?;
    catalog::require_user(db.pool(), recipient_id).await?;
    if let Some(subject_id) = subject_id {
        catalog::require_subject(db.pool(), subject_id).await?;
    }

    let cards = catalog::list_cards(db, topic_id).await?;

    let now = Utc::now();
    let now_ts = db::timestamp(now);
    let copy = Topic {
        id: Uuid::new_v4().to_string(),
        user_id: recipient_id.to_string(),
        subject_id: subject_id.map(str::to_string),
        title: source.title.clone(),
        created_at: now_ts.clone(),
        updated_at: now_ts.clone(),
    };

    let mut tx = db.pool().begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "topics" ("id", "userId", "subjectId", "title", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&copy.id)
    .bind(&copy.user_id)
    .bind(&copy.subject_id)
    .bind(&copy.title)
    .bind(&copy.created_at)
    .bind(&copy.updated_at)
    .execute(&mut *tx)
    .await?;

    catalog::insert_config_if_absent(&mut tx, &copy.id, recipient_id, &now_ts).await?;

    for card in &cards {
        let card_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO "cards" ("id", "topicId", "front", "back", "createdAt", "updatedAt")
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&card_id)
        .bind(&copy.id)
        .bind(&card.front)
        .bind(&card.back)
        .bind(&now_ts)
        .bind(&now_ts)
        .execute(&mut *tx)
        .await?;

        progress::insert_if_absent(&mut tx, &card_id, recipient_id, now).await?;
    }

    tx.commit().await?;

    tracing::info!(
        source = %topic_id,
        copy = %copy.id,
        recipient = %recipient_id,
        cards = cards.len(),
        "shared topic as a copy"
    );

    Ok(copy)
}

/// Gives `recipient_id` an independent view of an existing topic: a config
/// and one progress record per card, created only where missing. The
/// collaborator studies the same cards but tracks separate progress.
/// Calling this twice changes nothing.
pub async fn add_collaborator(
    db: &Database,
    topic_id: &str,
    recipient_id: &str,
) -> Result<(), StudyError> {
    catalog::require_topic(db.pool(), topic_id).await?;
    catalog::require_user(db.pool(), recipient_id).await?;

    let cards = catalog::list_cards(db, topic_id).await?;

    let now = Utc::now();
    let now_ts = db::timestamp(now);

    let mut tx = db.pool().begin().await?;

    catalog::insert_config_if_absent(&mut tx, topic_id, recipient_id, &now_ts).await?;
    for card in &cards {
        progress::insert_if_absent(&mut tx, &card.id, recipient_id, now).await?;
    }

    tx.commit().await?;

    tracing::info!(topic = %topic_id, recipient = %recipient_id, "added collaborator");
    Ok(())
}

/// Removes `recipient_id`'s config and progress for the topic. Card content
/// and other collaborators' state are unaffected.
pub async fn remove_collaborator(
    db: &Database,
    topic_id: &str,
    recipient_id: &str,
) -> Result<(), StudyError> {
    catalog::require_topic(db.pool(), topic_id).await?;

    let mut tx = db.pool().begin().await?;

    progress::delete_for_topic(&mut tx, topic_id, recipient_id).await?;
    sqlx::query(r#"DELETE FROM "topic_configs" WHERE "topicId" = ? AND "userId" = ?"#)
        .bind(topic_id)
        .bind(recipient_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(topic = %topic_id, recipient = %recipient_id, "removed collaborator");
    Ok(())
}

/// Restarts `user_id`'s progress across the whole topic: level 1 and a due
/// date projected from now. Returns the number of records reset.
pub async fn reset_all(
    db: &Database,
    projector: &dyn ReviewProjector,
    topic_id: &str,
    user_id: &str,
) -> Result<u64, StudyError> {
    catalog::require_topic(db.pool(), topic_id).await?;
    catalog::require_user(db.pool(), user_id).await?;

    let due_at = projector.project(Utc::now(), progress::INITIAL_LEVEL);
    let touched = progress::reset_for_topic(db.pool(), topic_id, user_id, due_at).await?;

    tracing::info!(topic = %topic_id, user = %user_id, records = touched, "reset topic progress");
    Ok(touched)
}
