//! Timezone shift detection and gradual adjustment schedules.

use crate::{Error, Repository, Result, TimezoneAdjustment};
use chrono::Duration;
use std::sync::Arc;

const TIMEZONE_LOOKBACK_DAYS: i64 = 7;
/// Offset changes up to this many minutes are ignored
const TIMEZONE_CHANGE_THRESHOLD_MINUTES: i64 = 60;
/// Daily shift applied while adjusting
const INCREMENT_MINUTES: i64 = 30;
/// Largest accepted UTC offset, either side of zero
const MAX_UTC_OFFSET_MINUTES: u32 = 24 * 60;
/// Widest shift between two accepted offsets
const MAX_SHIFT_HOURS: i32 = 48;

/// Compares the current UTC offset with the one recorded on recent sessions
pub struct TimezoneShiftDetector {
    repository: Arc<dyn Repository>,
}

impl TimezoneShiftDetector {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Detect a move to a new timezone since the last completed session
    ///
    /// Returns `None` when there is no recent completed session or the offset
    /// moved by an hour or less. `current_tz_label` may be blank, in which case
    /// the new timezone is labelled from the offset (e.g. `UTC+5:30`).
    pub fn detect_timezone_change(
        &self,
        subject_id: &str,
        current_offset_minutes: i32,
        current_tz_label: &str,
    ) -> Result<Option<TimezoneAdjustment>> {
        if current_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(Error::InvalidArgument(format!(
                "timezone offset must be within ±{} minutes, got {}",
                MAX_UTC_OFFSET_MINUTES, current_offset_minutes
            )));
        }

        let mut recent: Vec<_> = self
            .repository
            .get_sessions(subject_id, TIMEZONE_LOOKBACK_DAYS)?
            .into_iter()
            .filter(|s| s.end_time.is_some())
            .collect();
        recent.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

        let Some(last) = recent.first() else {
            tracing::debug!("No completed sessions for {} in the last week", subject_id);
            return Ok(None);
        };
        let last_offset = last.timezone_offset_minutes;

        let delta = i64::from(current_offset_minutes) - i64::from(last_offset);
        if delta.abs() <= TIMEZONE_CHANGE_THRESHOLD_MINUTES {
            return Ok(None);
        }

        // Integer division truncates toward zero, keeping the sign
        let hours_difference = i32::try_from(delta / 60).map_err(|_| {
            Error::InvalidArgument(format!("stored offset {} is out of range", last_offset))
        })?;
        let schedule = build_adjustment_schedule(hours_difference.abs())?;

        let new_timezone = if current_tz_label.trim().is_empty() {
            utc_label(current_offset_minutes)
        } else {
            current_tz_label.to_string()
        };

        tracing::info!(
            "Timezone change for {}: {} -> {} ({:+} h, {} day plan)",
            subject_id,
            utc_label(last_offset),
            new_timezone,
            hours_difference,
            schedule.len()
        );

        Ok(Some(TimezoneAdjustment {
            old_timezone: utc_label(last_offset),
            new_timezone,
            hours_difference,
            estimated_days: schedule.len(),
            adjustment_schedule: schedule,
        }))
    }
}

/// Daily cumulative shifts, 30 minutes apart, until `hours_difference` is covered
pub fn build_adjustment_schedule(hours_difference: i32) -> Result<Vec<Duration>> {
    if hours_difference < 0 {
        return Err(Error::InvalidArgument(format!(
            "hoursDifference must be non-negative for schedule, got {}",
            hours_difference
        )));
    }
    if hours_difference > MAX_SHIFT_HOURS {
        return Err(Error::InvalidArgument(format!(
            "hoursDifference must be at most {}, got {}",
            MAX_SHIFT_HOURS, hours_difference
        )));
    }

    let total_minutes = i64::from(hours_difference) * 60;
    let steps = (total_minutes + INCREMENT_MINUTES - 1) / INCREMENT_MINUTES;

    Ok((1..=steps)
        .map(|day| Duration::minutes(day * INCREMENT_MINUTES))
        .collect())
}

/// `UTC+3`, `UTC-5`, `UTC+5:30`
pub fn utc_label(offset_minutes: i32) -> String {
    let sign = if offset_minutes >= 0 { '+' } else { '-' };
    let abs = offset_minutes.unsigned_abs();
    let (hours, minutes) = (abs / 60, abs % 60);
    if minutes == 0 {
        format!("UTC{}{}", sign, hours)
    } else {
        format!("UTC{}{}:{:02}", sign, hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{completed, fixed_instant, open};
    use crate::{InMemoryRepository, ManualClock, SleepSession, TimeProvider};

    fn detector_with(sessions: Vec<SleepSession>) -> TimezoneShiftDetector {
        let clock: Arc<dyn TimeProvider> = Arc::new(ManualClock::new(fixed_instant()));
        TimezoneShiftDetector::new(Arc::new(InMemoryRepository::with_sessions(clock, sessions)))
    }

    fn at_offset(mut session: SleepSession, offset: i32) -> SleepSession {
        session.timezone_offset_minutes = offset;
        session
    }

    #[test]
    fn test_schedule_shapes() {
        assert!(build_adjustment_schedule(0).unwrap().is_empty());

        let two = build_adjustment_schedule(2).unwrap();
        assert_eq!(
            two,
            vec![
                Duration::minutes(30),
                Duration::minutes(60),
                Duration::minutes(90),
                Duration::minutes(120),
            ]
        );

        let three = build_adjustment_schedule(3).unwrap();
        assert_eq!(three.len(), 6);
        assert_eq!(three.last(), Some(&Duration::minutes(180)));
    }

    #[test]
    fn test_schedule_rejects_negative() {
        let err = build_adjustment_schedule(-1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_schedule_rejects_impossible_shifts() {
        assert_eq!(build_adjustment_schedule(48).unwrap().len(), 96);
        for hours in [49, 40_000_000, i32::MAX] {
            let err = build_adjustment_schedule(hours).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_out_of_range_offsets_are_rejected() {
        let detector = detector_with(vec![at_offset(completed("a", 60, fixed_instant()), 60)]);
        for offset in [i32::MIN, i32::MAX, 1441, -1441] {
            let err = detector.detect_timezone_change("baby1", offset, "").unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }

        // Widest accepted jump
        let detector = detector_with(vec![at_offset(completed("a", 60, fixed_instant()), -1440)]);
        let adjustment = detector
            .detect_timezone_change("baby1", 1440, "")
            .unwrap()
            .unwrap();
        assert_eq!(adjustment.hours_difference, 48);
        assert_eq!(adjustment.estimated_days, 96);
    }

    #[test]
    fn test_corrupt_stored_offset_is_an_error() {
        let detector =
            detector_with(vec![at_offset(completed("a", 60, fixed_instant()), i32::MIN)]);
        let err = detector.detect_timezone_change("baby1", 0, "").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_no_history_means_no_change() {
        let detector = detector_with(vec![]);
        assert!(detector
            .detect_timezone_change("baby1", 180, "")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_one_hour_shift_is_ignored() {
        let detector = detector_with(vec![completed("a", 60, fixed_instant())]);
        assert!(detector
            .detect_timezone_change("baby1", 60, "")
            .unwrap()
            .is_none());
        assert!(detector
            .detect_timezone_change("baby1", -60, "")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_three_hour_shift() {
        let detector = detector_with(vec![completed("a", 60, fixed_instant())]);
        let adjustment = detector
            .detect_timezone_change("baby1", 180, "Europe/Moscow")
            .unwrap()
            .unwrap();

        assert_eq!(adjustment.hours_difference, 3);
        assert_eq!(adjustment.estimated_days, 6);
        assert_eq!(adjustment.adjustment_schedule.len(), 6);
        assert_eq!(adjustment.old_timezone, "UTC+0");
        assert_eq!(adjustment.new_timezone, "Europe/Moscow");
    }

    #[test]
    fn test_westward_shift_truncates_and_keeps_sign() {
        let detector = detector_with(vec![at_offset(completed("a", 60, fixed_instant()), 60)]);
        // -330 - 60 = -390 minutes -> -6 hours (truncated)
        let adjustment = detector
            .detect_timezone_change("baby1", -330, "  ")
            .unwrap()
            .unwrap();

        assert_eq!(adjustment.hours_difference, -6);
        assert_eq!(adjustment.estimated_days, 12);
        assert_eq!(adjustment.old_timezone, "UTC+1");
        assert_eq!(adjustment.new_timezone, "UTC-5:30");
    }

    #[test]
    fn test_uses_most_recently_modified_completed_session() {
        let now = fixed_instant();
        let mut older = at_offset(completed("older", 60, now - Duration::hours(5)), 0);
        older.modified_at = now - Duration::hours(5);
        let mut newer = at_offset(completed("newer", 60, now - Duration::hours(1)), 180);
        newer.modified_at = now - Duration::hours(1);
        // Open sessions are ignored even if they carry a different offset
        let live = at_offset(open("live", "baby1", now), 600);

        let detector = detector_with(vec![older, newer, live]);
        assert!(detector
            .detect_timezone_change("baby1", 180, "")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_utc_label_formats() {
        assert_eq!(utc_label(0), "UTC+0");
        assert_eq!(utc_label(330), "UTC+5:30");
        assert_eq!(utc_label(-480), "UTC-8");
        assert_eq!(utc_label(-45), "UTC-0:45");
    }
}
