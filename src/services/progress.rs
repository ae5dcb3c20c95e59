use chrono::Utc;
use serde::Deserialize;

use crate::db::operations::progress::{self, ProgressRecord};
use crate::db::{self, Database};
use crate::error::StudyError;
use crate::services::projector::ReviewProjector;

/// Weight of the newest observation in the running answer-time estimate.
const ANSWER_TIME_SMOOTHING: f64 = 0.3;

/// One study answer for a (card, user) pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub is_correct: bool,
    pub response_time_ms: i64,
}

/// Applies a study answer: a correct answer advances the level by one, an
/// incorrect answer drops it back to the start. In both cases the next due
/// date comes from the same projector the scheduler simulates with, so
/// future-date previews match what actually gets scheduled.
pub async fn record_answer(
    db: &Database,
    projector: &dyn ReviewProjector,
    card_id: &str,
    user_id: &str,
    event: AnswerEvent,
) -> Result<ProgressRecord, StudyError> {
    if event.response_time_ms < 0 {
        return Err(StudyError::validation("response time must not be negative"));
    }

    let record = progress::get(db.pool(), card_id, user_id)
        .await?
        .ok_or_else(|| {
            StudyError::not_found(format!("progress for card {card_id} and user {user_id}"))
        })?;

    let now = Utc::now();
    let level = if event.is_correct {
        record.level + 1
    } else {
        progress::INITIAL_LEVEL
    };
    let due_at = projector.project(now, level);
    let answer_time_ms = smooth_answer_time(record.answer_time_ms, event.response_time_ms);

    progress::update_after_answer(db.pool(), card_id, user_id, level, due_at, answer_time_ms)
        .await?;

    tracing::debug!(
        card = %card_id,
        user = %user_id,
        level,
        correct = event.is_correct,
        "recorded study answer"
    );

    Ok(ProgressRecord {
        level,
        due_at,
        answer_time_ms,
        updated_at: db::timestamp(now),
        ..record
    })
}

fn smooth_answer_time(current_ms: i64, observed_ms: i64) -> i64 {
    if current_ms == 0 {
        return observed_ms;
    }
    let smoothed = current_ms as f64 * (1.0 - ANSWER_TIME_SMOOTHING)
        + observed_ms as f64 * ANSWER_TIME_SMOOTHING;
    smoothed.round() as i64
}
