//! Wake-window notification hand-off.
//!
//! Delivery belongs to an external collaborator. The core only hands a
//! finished recommendation over; see [`crate::WakeWindowEngine::recommend_and_notify`].

use crate::{Result, WakeWindowRecommendation};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Receiver of computed recommendations
pub trait NotificationScheduler: Send + Sync {
    fn schedule_wake_window_notification(
        &self,
        recommendation: &WakeWindowRecommendation,
    ) -> Result<()>;
}

/// Scheduler that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl NotificationScheduler for TracingNotifier {
    fn schedule_wake_window_notification(
        &self,
        recommendation: &WakeWindowRecommendation,
    ) -> Result<()> {
        tracing::info!(
            "Wake window notification due at {} ({} min window)",
            recommendation.next_sleep_time,
            recommendation.duration.num_minutes()
        );
        Ok(())
    }
}

/// JSONL outbox drained by an external delivery daemon
///
/// Each recommendation is appended as one JSON line under an exclusive lock.
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl NotificationScheduler for OutboxNotifier {
    fn schedule_wake_window_notification(
        &self,
        recommendation: &WakeWindowRecommendation,
    ) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(recommendation)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!(
            "Queued wake window notification for {} in {:?}",
            recommendation.next_sleep_time,
            self.path
        );
        Ok(())
    }
}
