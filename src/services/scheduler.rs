use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::db::operations::catalog;
use crate::db::operations::progress::{self, DueProgress};
use crate::db::Database;
use crate::error::StudyError;
use crate::services::projector::ReviewProjector;

/// Backstop for the forward simulation; a healthy projector reaches any
/// future query date in far fewer steps.
const MAX_PROJECTION_STEPS: usize = 4096;

/// Review workload for one topic on the queried date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDue {
    pub topic_id: String,
    pub title: String,
    pub cards_count: usize,
    pub approx_time_ms: i64,
}

/// A single entry in the due-now feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCard {
    pub card_id: String,
    pub topic_id: String,
    pub due_at: DateTime<Utc>,
}

/// Computes the per-topic review workload for `user_id` on `date`.
///
/// Topics the user is not actively reviewing (or has archived) are skipped.
/// For a past or current date this collects everything due up to the end of
/// that day; for a future date it combines cards already scheduled on that
/// day with cards whose simulated review chain lands on it.
pub async fn topics_due(
    db: &Database,
    projector: &dyn ReviewProjector,
    user_id: &str,
    date: NaiveDate,
) -> Result<Vec<TopicDue>, StudyError> {
    catalog::require_user(db.pool(), user_id).await?;

    let topics = catalog::reviewing_topics(db, user_id).await?;
    if topics.is_empty() {
        return Ok(Vec::new());
    }
    let topic_ids: Vec<String> = topics.iter().map(|t| t.id.clone()).collect();

    let day_start = date.and_time(NaiveTime::MIN).and_utc();
    let day_end = day_start + Duration::days(1);
    let today = Utc::now().date_naive();

    let candidates = if date <= today {
        // Catch-up: everything overdue plus due that day, no projection.
        progress::due_in_topics_before(db.pool(), user_id, &topic_ids, day_end).await?
    } else {
        future_candidates(db, projector, user_id, &topic_ids, date, day_start, day_end).await?
    };

    let mut per_topic: BTreeMap<String, (usize, i64)> = BTreeMap::new();
    for candidate in &candidates {
        let entry = per_topic.entry(candidate.topic_id.clone()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += candidate.answer_time_ms;
    }

    // `topics` is already ordered by id; topics with no matching cards drop out.
    let mut result = Vec::with_capacity(per_topic.len());
    for topic in topics {
        if let Some(&(cards_count, approx_time_ms)) = per_topic.get(&topic.id) {
            result.push(TopicDue {
                topic_id: topic.id,
                title: topic.title,
                cards_count,
                approx_time_ms,
            });
        }
    }
    Ok(result)
}

/// All cards due at this instant for `user_id`, across every topic the user
/// actively reviews, ordered by due date then card id.
pub async fn cards_due_now(db: &Database, user_id: &str) -> Result<Vec<DueCard>, StudyError> {
    catalog::require_user(db.pool(), user_id).await?;

    let due = progress::due_at_or_before(db.pool(), user_id, Utc::now()).await?;
    Ok(due
        .into_iter()
        .map(|record| DueCard {
            card_id: record.card_id,
            topic_id: record.topic_id,
            due_at: record.due_at,
        })
        .collect())
}

async fn future_candidates(
    db: &Database,
    projector: &dyn ReviewProjector,
    user_id: &str,
    topic_ids: &[String],
    date: NaiveDate,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> Result<Vec<DueProgress>, StudyError> {
    // Cards already scheduled within the queried day.
    let mut candidates =
        progress::due_in_topics_within(db.pool(), user_id, topic_ids, day_start, day_end).await?;

    // Cards due earlier whose review chain, simulated forward, lands on the
    // queried day. Disjoint from the bucket above by the date bounds, so no
    // card is ever counted twice in one response.
    let earlier = progress::due_in_topics_before(db.pool(), user_id, topic_ids, day_start).await?;
    for record in earlier {
        if projection_lands_on(projector, &record, day_start, date)? {
            candidates.push(record);
        }
    }
    Ok(candidates)
}

/// Simulates future reviews from the record's current due date and level,
/// one level per step, each step projecting from the previous projected
/// date. The card belongs on the queried day iff the first projection at or
/// past `day_start` falls on that calendar day.
fn projection_lands_on(
    projector: &dyn ReviewProjector,
    record: &DueProgress,
    day_start: DateTime<Utc>,
    date: NaiveDate,
) -> Result<bool, StudyError> {
    let mut current = record.due_at;
    let mut level = record.level;

    for _ in 0..MAX_PROJECTION_STEPS {
        level += 1;
        let next = projector.project(current, level);
        if next <= current {
            return Err(StudyError::ProjectorInvariant(format!(
                "projection made no progress at level {level} (card {})",
                record.card_id
            )));
        }
        if next >= day_start {
            return Ok(next.date_naive() == date);
        }
        current = next;
    }

    Err(StudyError::ProjectorInvariant(format!(
        "projection exceeded {MAX_PROJECTION_STEPS} steps (card {})",
        record.card_id
    )))
}
