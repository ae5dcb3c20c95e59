use chrono::{DateTime, Duration, Utc};

/// Computes the next due date from a current due date and level.
///
/// Implementations must be pure and, for a fixed date, non-decreasing in
/// `level`. The scheduler's forward simulation terminates only under that
/// contract and aborts the query when it observes a violation, so a custom
/// policy that breaks it surfaces as an error rather than a hang.
pub trait ReviewProjector: Send + Sync {
    fn project(&self, due: DateTime<Utc>, level: i64) -> DateTime<Utc>;
}

/// Interval ladder in days, indexed by level. Levels past the end clamp to
/// the final interval.
const INTERVAL_DAYS: [i64; 10] = [1, 2, 4, 7, 14, 30, 60, 120, 240, 365];

/// Default interval policy: a graded ladder from one day up to a year.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradedIntervalProjector;

impl GradedIntervalProjector {
    pub fn interval_days(level: i64) -> i64 {
        let index = level.clamp(1, INTERVAL_DAYS.len() as i64) - 1;
        INTERVAL_DAYS[index as usize]
    }
}

impl ReviewProjector for GradedIntervalProjector {
    fn project(&self, due: DateTime<Utc>, level: i64) -> DateTime<Utc> {
        due + Duration::days(Self::interval_days(level))
    }
}
