//! Age-based default wake windows.

use crate::{Error, Result};
use chrono::Duration;

/// Inclusive upper age bound (weeks) paired with its wake window (minutes)
const BASELINE_TABLE: [(i32, i64); 7] = [
    (4, 45),
    (8, 60),
    (12, 75),
    (16, 90),
    (24, 120),
    (36, 150),
    (52, 180),
];

/// Wake window for anyone older than the last table row
const TODDLER_WINDOW_MINUTES: i64 = 240;

/// Default wake window for a baby of the given age
///
/// Fails with [`Error::InvalidArgument`] for a negative age.
pub fn compute_baseline(age_in_weeks: i32) -> Result<Duration> {
    if age_in_weeks < 0 {
        return Err(Error::InvalidArgument(format!(
            "ageInWeeks must be non-negative, got {}",
            age_in_weeks
        )));
    }

    let minutes = BASELINE_TABLE
        .iter()
        .find(|(max_weeks, _)| age_in_weeks <= *max_weeks)
        .map(|(_, minutes)| *minutes)
        .unwrap_or(TODDLER_WINDOW_MINUTES);

    Ok(Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_minutes(age: i32) -> i64 {
        compute_baseline(age).unwrap().num_minutes()
    }

    #[test]
    fn test_step_table_bounds() {
        let cases = [
            (0, 45),
            (4, 45),
            (5, 60),
            (8, 60),
            (9, 75),
            (12, 75),
            (13, 90),
            (16, 90),
            (17, 120),
            (24, 120),
            (25, 150),
            (36, 150),
            (37, 180),
            (52, 180),
            (53, 240),
            (104, 240),
        ];
        for (age, expected) in cases {
            assert_eq!(baseline_minutes(age), expected, "age {} weeks", age);
        }
    }

    #[test]
    fn test_negative_age_rejected() {
        let err = compute_baseline(-1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        let mut previous = Duration::zero();
        for age in 0..=160 {
            let current = compute_baseline(age).unwrap();
            assert!(current >= previous, "baseline dropped at {} weeks", age);
            previous = current;
        }
    }
}
