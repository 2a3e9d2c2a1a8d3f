//! Data export.
//!
//! Produces a full JSON dump of sessions and profiles, and a flat CSV of
//! sessions for spreadsheets.

use crate::{BabyProfile, Result, SleepSession, SyncStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Everything the user has stored, as one document
#[derive(Debug, Serialize)]
pub struct DataExport<'a> {
    pub exported_at: DateTime<Utc>,
    pub sleep_sessions: &'a [SleepSession],
    pub baby_profiles: &'a [BabyProfile],
}

/// Pretty JSON dump of all sessions and profiles
pub fn export_json(
    sessions: &[SleepSession],
    profiles: &[BabyProfile],
    exported_at: DateTime<Utc>,
) -> Result<String> {
    let export = DataExport {
        exported_at,
        sleep_sessions: sessions,
        baby_profiles: profiles,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// A row in the CSV output
#[derive(Debug, Serialize)]
struct CsvRow {
    id: String,
    subject_id: String,
    start_time: String,
    end_time: Option<String>,
    duration_minutes: Option<i64>,
    quality_score: Option<f32>,
    timezone_offset_minutes: i32,
    sync_status: &'static str,
    initiator_device_id: String,
    modified_at: String,
    created_at: String,
}

impl From<&SleepSession> for CsvRow {
    fn from(session: &SleepSession) -> Self {
        CsvRow {
            id: session.id.clone(),
            subject_id: session.subject_id.clone(),
            start_time: session.start_time.to_rfc3339(),
            end_time: session.end_time.map(|t| t.to_rfc3339()),
            duration_minutes: session.duration_minutes,
            quality_score: session.quality_score,
            timezone_offset_minutes: session.timezone_offset_minutes,
            sync_status: match session.sync_status {
                SyncStatus::Pending => "pending",
                SyncStatus::Synced => "synced",
                SyncStatus::Failed => "failed",
            },
            initiator_device_id: session.initiator_device_id.clone(),
            modified_at: session.modified_at.to_rfc3339(),
            created_at: session.created_at.to_rfc3339(),
        }
    }
}

/// Write sessions to a fresh CSV file with headers, synced to disk
///
/// Returns the number of rows written.
pub fn write_sessions_csv(sessions: &[SleepSession], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(csv_path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(file);

    for session in sessions {
        writer.serialize(CsvRow::from(session))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} sessions to {:?}", sessions.len(), csv_path);
    Ok(sessions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{completed, fixed_instant, open};

    #[test]
    fn test_csv_has_header_and_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("out").join("sessions.csv");
        let sessions = vec![
            completed("a", 45, fixed_instant()),
            open("b", "baby1", fixed_instant()),
        ];

        let count = write_sessions_csv(&sessions, &csv_path).unwrap();
        assert_eq!(count, 2);

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("id,subject_id,start_time,end_time,duration_minutes"));

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_csv_overwrites_previous_export() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("sessions.csv");

        write_sessions_csv(&[completed("a", 45, fixed_instant())], &csv_path).unwrap();
        write_sessions_csv(&[completed("b", 30, fixed_instant())], &csv_path).unwrap();

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 1);
    }

    #[test]
    fn test_json_export_contains_everything() {
        let sessions = vec![completed("a", 45, fixed_instant())];
        let json = export_json(&sessions, &[], fixed_instant()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["sleep_sessions"][0]["id"], "a");
        assert_eq!(value["sleep_sessions"][0]["duration_minutes"], 45);
        assert!(value["baby_profiles"].as_array().unwrap().is_empty());
    }
}
