//! Session repository capability and an in-memory implementation.
//!
//! The repository owns durable session state. Implementations enforce two
//! identity constraints at insert time:
//! - session ids are unique (violations are [`Error::Persistence`])
//! - a subject has at most one session without an end time
//!   (violations are [`Error::Conflict`])

use crate::{Error, Result, SleepSession, SyncStatus, TimeProvider};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage for sleep sessions
pub trait Repository: Send + Sync {
    /// Sessions for a subject that started within the last `days` days, newest first
    fn get_sessions(&self, subject_id: &str, days: i64) -> Result<Vec<SleepSession>>;

    fn get_session(&self, session_id: &str) -> Result<Option<SleepSession>>;

    fn get_active_session(&self, subject_id: &str) -> Result<Option<SleepSession>>;

    fn insert_session(&self, session: &SleepSession) -> Result<()>;

    /// Replace a stored session; fails with [`Error::NotFound`] if the id is unknown
    fn update_session(&self, session: &SleepSession) -> Result<()>;

    /// Replace `current` with `updated` only if the stored row still equals `current`
    ///
    /// A row changed by another writer since `current` was read fails with
    /// [`Error::InvalidState`] and is left untouched.
    fn replace_session(&self, current: &SleepSession, updated: &SleepSession) -> Result<()>;

    fn delete_session(&self, session_id: &str) -> Result<()>;

    fn get_pending_sync_sessions(&self) -> Result<Vec<SleepSession>>;

    fn mark_synced(&self, session_id: &str, synced_at: DateTime<Utc>) -> Result<()>;
}

/// Reject an insert that would break id uniqueness or the one-open-session rule
pub(crate) fn check_insert(existing: &[SleepSession], session: &SleepSession) -> Result<()> {
    if existing.iter().any(|s| s.id == session.id) {
        return Err(Error::Persistence(format!(
            "duplicate session id {}",
            session.id
        )));
    }

    if session.is_active() {
        if let Some(open) = existing
            .iter()
            .find(|s| s.subject_id == session.subject_id && s.is_active())
        {
            return Err(Error::Conflict {
                subject_id: session.subject_id.clone(),
                existing_session_id: open.id.clone(),
            });
        }
    }

    Ok(())
}

/// Compare-and-swap precondition shared by the repositories
pub(crate) fn check_replace(stored: Option<&SleepSession>, current: &SleepSession) -> Result<()> {
    match stored {
        None => Err(Error::NotFound(current.id.clone())),
        Some(stored) if stored != current => Err(Error::InvalidState(format!(
            "Session {} was modified concurrently",
            current.id
        ))),
        Some(_) => Ok(()),
    }
}

/// Start of a `days`-long history window ending at `now`
///
/// `None` when the window reaches past the representable range, meaning all history.
pub(crate) fn history_cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|window| now.checked_sub_signed(window))
}

/// Sessions of `subject_id` starting at or after `cutoff`, newest start first
pub(crate) fn recent_for_subject(
    sessions: impl IntoIterator<Item = SleepSession>,
    subject_id: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Vec<SleepSession> {
    let mut recent: Vec<_> = sessions
        .into_iter()
        .filter(|s| s.subject_id == subject_id)
        .filter(|s| cutoff.map_or(true, |cutoff| s.start_time >= cutoff))
        .collect();
    recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    recent
}

/// Process-local repository, handy for tests and embedding
pub struct InMemoryRepository {
    sessions: Mutex<HashMap<String, SleepSession>>,
    clock: Arc<dyn TimeProvider>,
}

impl InMemoryRepository {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Seed the repository, bypassing insert-time constraints
    pub fn with_sessions(
        clock: Arc<dyn TimeProvider>,
        sessions: impl IntoIterator<Item = SleepSession>,
    ) -> Self {
        let repo = Self::new(clock);
        {
            let mut map = repo.lock();
            for session in sessions {
                map.insert(session.id.clone(), session);
            }
        }
        repo
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SleepSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Repository for InMemoryRepository {
    fn get_sessions(&self, subject_id: &str, days: i64) -> Result<Vec<SleepSession>> {
        let cutoff = history_cutoff(self.clock.now(), days);
        let sessions = self.lock().values().cloned().collect::<Vec<_>>();
        Ok(recent_for_subject(sessions, subject_id, cutoff))
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SleepSession>> {
        Ok(self.lock().get(session_id).cloned())
    }

    fn get_active_session(&self, subject_id: &str) -> Result<Option<SleepSession>> {
        Ok(self
            .lock()
            .values()
            .find(|s| s.subject_id == subject_id && s.is_active())
            .cloned())
    }

    fn insert_session(&self, session: &SleepSession) -> Result<()> {
        let mut map = self.lock();
        let existing: Vec<_> = map.values().cloned().collect();
        check_insert(&existing, session)?;
        map.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn update_session(&self, session: &SleepSession) -> Result<()> {
        let mut map = self.lock();
        match map.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(Error::NotFound(session.id.clone())),
        }
    }

    fn replace_session(&self, current: &SleepSession, updated: &SleepSession) -> Result<()> {
        let mut map = self.lock();
        check_replace(map.get(&current.id), current)?;
        map.insert(updated.id.clone(), updated.clone());
        Ok(())
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        self.lock().remove(session_id);
        Ok(())
    }

    fn get_pending_sync_sessions(&self) -> Result<Vec<SleepSession>> {
        let mut pending: Vec<_> = self
            .lock()
            .values()
            .filter(|s| s.sync_status == SyncStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.modified_at.cmp(&b.modified_at));
        Ok(pending)
    }

    fn mark_synced(&self, session_id: &str, synced_at: DateTime<Utc>) -> Result<()> {
        let mut map = self.lock();
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        session.sync_status = SyncStatus::Synced;
        session.modified_at = synced_at;
        Ok(())
    }
}
