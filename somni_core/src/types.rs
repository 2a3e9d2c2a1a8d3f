//! Core domain types for the Somni sleep tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Sleep sessions and their sync status
//! - Wake-window recommendations produced by the engine
//! - Timezone adjustments produced by the shift detector
//! - Baby profiles used to derive age

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Session Types
// ============================================================================

/// Remote sync state of a session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// A recorded sleep session
///
/// `end_time` and `duration_minutes` are either both set or both absent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SleepSession {
    pub id: String,
    pub subject_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub quality_score: Option<f32>,
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub sync_status: SyncStatus,
    pub initiator_device_id: String,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SleepSession {
    /// A session with no recorded end time
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Whole minutes elapsed from `start` to `end`, truncated and floored at zero
pub fn whole_minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

// ============================================================================
// Engine Output Types
// ============================================================================

/// Recommended time awake before the next sleep
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WakeWindowRecommendation {
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub adjustment_reason: Option<String>,
    pub confidence: f64,
    pub next_sleep_time: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub baseline_window: Duration,
    pub adjustment_multiplier: f64,
}

/// Plan for easing a subject onto a new timezone
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimezoneAdjustment {
    pub old_timezone: String,
    pub new_timezone: String,
    pub hours_difference: i32,
    #[serde(with = "duration_millis_vec")]
    pub adjustment_schedule: Vec<Duration>,
    pub estimated_days: usize,
}

// ============================================================================
// Profile Types
// ============================================================================

/// A tracked baby
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BabyProfile {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl BabyProfile {
    /// Completed weeks of age on `today`; zero for a birthdate in the future
    pub fn age_in_weeks(&self, today: NaiveDate) -> i32 {
        let days = (today - self.birthdate).num_days().max(0);
        i32::try_from(days / 7).unwrap_or(i32::MAX)
    }

    /// Coarse month count (four weeks per month)
    pub fn age_in_months(&self, today: NaiveDate) -> i32 {
        self.age_in_weeks(today) / 4
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::milliseconds)
    }
}

mod duration_millis_vec {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<i64> = v.iter().map(Duration::num_milliseconds).collect();
        millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let millis = Vec::<i64>::deserialize(d)?;
        Ok(millis.into_iter().map(Duration::milliseconds).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_whole_minutes_truncates_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let end = start + Duration::minutes(45) + Duration::seconds(30);
        assert_eq!(whole_minutes_between(start, end), 45);
    }

    #[test]
    fn test_whole_minutes_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(whole_minutes_between(start, start - Duration::minutes(5)), 0);
    }

    #[test]
    fn test_age_in_weeks() {
        let profile = BabyProfile {
            id: "baby1".into(),
            name: "Ada".into(),
            birthdate: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_at: Utc::now(),
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(); // 84 days
        assert_eq!(profile.age_in_weeks(today), 12);
        assert_eq!(profile.age_in_months(today), 3);

        let before_birth = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(profile.age_in_weeks(before_birth), 0);
    }

    #[test]
    fn test_sync_status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::Synced).unwrap();
        assert_eq!(json, "\"synced\"");
    }
}
