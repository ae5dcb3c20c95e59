mod common;

use chrono::{Duration, Utc};

use kartei_engine::db::operations::progress;
use kartei_engine::error::StudyError;
use kartei_engine::services::progress::{record_answer, AnswerEvent};
use kartei_engine::services::projector::GradedIntervalProjector;
use kartei_engine::services::scheduler;

#[tokio::test]
async fn new_cards_start_at_level_one_and_are_due_immediately() {
    let (_dir, db) = common::open_test_db().await;
    let user = common::user(&db, "ida").await;
    let (_topic, cards) = common::reviewing_topic(&db, &user.id, "Clouds", 1).await;

    let record = progress::get(db.pool(), &cards[0].id, &user.id)
        .await
        .expect("get progress")
        .expect("record exists");
    assert_eq!(record.level, 1);
    assert_eq!(record.answer_time_ms, 0);
    assert!(record.due_at <= Utc::now());

    let feed = scheduler::cards_due_now(&db, &user.id).await.expect("cards_due_now");
    assert_eq!(feed.len(), 1);
}

#[tokio::test]
async fn correct_answer_advances_level_and_pushes_the_due_date() {
    let (_dir, db) = common::open_test_db().await;
    let user = common::user(&db, "juno").await;
    let (_topic, cards) = common::reviewing_topic(&db, &user.id, "Winds", 1).await;

    let before = Utc::now();
    let record = record_answer(
        &db,
        &GradedIntervalProjector,
        &cards[0].id,
        &user.id,
        AnswerEvent {
            is_correct: true,
            response_time_ms: 3100,
        },
    )
    .await
    .expect("record answer");

    assert_eq!(record.level, 2);
    assert_eq!(record.answer_time_ms, 3100);
    // Level 2 projects two days out from "now".
    let offset = record.due_at - before;
    assert!(offset >= Duration::days(2) && offset < Duration::days(3));

    // The stored row matches what the call returned; stored timestamps carry
    // millisecond precision.
    let stored = progress::get(db.pool(), &cards[0].id, &user.id)
        .await
        .expect("get progress")
        .expect("record exists");
    assert_eq!(stored.level, 2);
    assert_eq!(
        stored.due_at.timestamp_millis(),
        record.due_at.timestamp_millis()
    );

    // And the card has left the due-now feed.
    let feed = scheduler::cards_due_now(&db, &user.id).await.expect("cards_due_now");
    assert!(feed.is_empty());
}

#[tokio::test]
async fn incorrect_answer_drops_back_to_level_one() {
    let (_dir, db) = common::open_test_db().await;
    let user = common::user(&db, "sol").await;
    let (_topic, cards) = common::reviewing_topic(&db, &user.id, "Tides", 1).await;

    common::set_due(&db, &cards[0].id, &user.id, Utc::now(), 6).await;

    let before = Utc::now();
    let record = record_answer(
        &db,
        &GradedIntervalProjector,
        &cards[0].id,
        &user.id,
        AnswerEvent {
            is_correct: false,
            response_time_ms: 8000,
        },
    )
    .await
    .expect("record answer");

    assert_eq!(record.level, 1);
    let offset = record.due_at - before;
    assert!(offset >= Duration::days(1) && offset < Duration::days(2));
}

#[tokio::test]
async fn answer_time_estimate_is_smoothed_across_answers() {
    let (_dir, db) = common::open_test_db().await;
    let user = common::user(&db, "pia").await;
    let (_topic, cards) = common::reviewing_topic(&db, &user.id, "Shells", 1).await;

    let first = record_answer(
        &db,
        &GradedIntervalProjector,
        &cards[0].id,
        &user.id,
        AnswerEvent {
            is_correct: true,
            response_time_ms: 2000,
        },
    )
    .await
    .expect("first answer");
    assert_eq!(first.answer_time_ms, 2000);

    let second = record_answer(
        &db,
        &GradedIntervalProjector,
        &cards[0].id,
        &user.id,
        AnswerEvent {
            is_correct: true,
            response_time_ms: 4000,
        },
    )
    .await
    .expect("second answer");
    assert!(second.answer_time_ms > 2000 && second.answer_time_ms < 4000);
}

#[tokio::test]
async fn answers_for_unknown_records_or_bad_input_are_rejected() {
    let (_dir, db) = common::open_test_db().await;
    let user = common::user(&db, "nell").await;
    let (_topic, cards) = common::reviewing_topic(&db, &user.id, "Gems", 1).await;

    let err = record_answer(
        &db,
        &GradedIntervalProjector,
        "missing-card",
        &user.id,
        AnswerEvent {
            is_correct: true,
            response_time_ms: 1000,
        },
    )
    .await
    .expect_err("unknown card must fail");
    assert!(matches!(err, StudyError::NotFound(_)));

    let err = record_answer(
        &db,
        &GradedIntervalProjector,
        &cards[0].id,
        &user.id,
        AnswerEvent {
            is_correct: true,
            response_time_ms: -5,
        },
    )
    .await
    .expect_err("negative response time must fail");
    assert!(matches!(err, StudyError::Validation(_)));
}
