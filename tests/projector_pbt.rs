//! Property-based checks for the default interval policy: projections never
//! shrink as the level grows, and always move strictly forward in time.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use kartei_engine::services::projector::{GradedIntervalProjector, ReviewProjector};

fn base_date(days: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
}

proptest! {
    #[test]
    fn projection_is_monotone_in_level(days in 0i64..20_000, l1 in 1i64..200, l2 in 1i64..200) {
        let due = base_date(days);
        let (lo, hi) = if l1 <= l2 { (l1, l2) } else { (l2, l1) };
        prop_assert!(
            GradedIntervalProjector.project(due, hi) >= GradedIntervalProjector.project(due, lo)
        );
    }

    #[test]
    fn projection_moves_strictly_forward(days in 0i64..20_000, level in 1i64..200) {
        let due = base_date(days);
        prop_assert!(GradedIntervalProjector.project(due, level) > due);
    }

    #[test]
    fn projection_is_deterministic(days in 0i64..20_000, level in 1i64..200) {
        let due = base_date(days);
        prop_assert_eq!(
            GradedIntervalProjector.project(due, level),
            GradedIntervalProjector.project(due, level)
        );
    }
}
