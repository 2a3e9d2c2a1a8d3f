//! Sleep session lifecycle.
//!
//! Per subject a session moves through:
//!
//! ```text
//! NoActiveSession -> ActiveSession -> CompletedSession (still editable)
//! ```
//!
//! Mutations are check-then-act against the repository. The manager holds a
//! per-subject lock across each check and its write. For writers in other
//! processes, repositories reject a second open session at insert time, and
//! ends and edits go through [`Repository::replace_session`], which refuses
//! to overwrite a row that changed after it was read.

use crate::{
    whole_minutes_between, Error, Repository, Result, SleepSession, SyncStatus, TimeProvider,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Source of fresh session identifiers
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `session-<epoch millis>-<6 hex digits>`
pub struct DefaultSessionIdGenerator {
    clock: Arc<dyn TimeProvider>,
}

impl DefaultSessionIdGenerator {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self { clock }
    }
}

impl SessionIdGenerator for DefaultSessionIdGenerator {
    fn generate(&self) -> String {
        let millis = self.clock.now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().gen_range(0..=0xFF_FFFF);
        format!("session-{}-{:06x}", millis, suffix)
    }
}

/// Starts, ends and edits sleep sessions
pub struct SessionLifecycleManager {
    repository: Arc<dyn Repository>,
    clock: Arc<dyn TimeProvider>,
    ids: Box<dyn SessionIdGenerator>,
    subject_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLifecycleManager {
    pub fn new(repository: Arc<dyn Repository>, clock: Arc<dyn TimeProvider>) -> Self {
        let ids = Box::new(DefaultSessionIdGenerator::new(clock.clone()));
        Self::with_id_generator(repository, clock, ids)
    }

    pub fn with_id_generator(
        repository: Arc<dyn Repository>,
        clock: Arc<dyn TimeProvider>,
        ids: Box<dyn SessionIdGenerator>,
    ) -> Self {
        Self {
            repository,
            clock,
            ids,
            subject_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock guarding check-then-act sequences for one subject
    fn subject_lock(&self, subject_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.subject_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(subject_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn with_subject_lock<T>(&self, subject_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.subject_lock(subject_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        self.release_subject_lock(subject_id, &lock);
        result
    }

    /// Drop the table entry once no other caller holds or waits on it
    fn release_subject_lock(&self, subject_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.subject_locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the table, one held by the caller
        if Arc::strong_count(lock) == 2 {
            locks.remove(subject_id);
        }
    }

    /// Open a new session; fails with [`Error::Conflict`] if one is already open
    pub fn start_session(
        &self,
        subject_id: &str,
        device_id: &str,
        timezone_offset_minutes: i32,
    ) -> Result<SleepSession> {
        self.with_subject_lock(subject_id, || {
            if let Some(existing) = self.repository.get_active_session(subject_id)? {
                return Err(Error::Conflict {
                    subject_id: subject_id.to_string(),
                    existing_session_id: existing.id,
                });
            }

            let now = self.clock.now();
            let session = SleepSession {
                id: self.ids.generate(),
                subject_id: subject_id.to_string(),
                start_time: now,
                end_time: None,
                duration_minutes: None,
                quality_score: None,
                timezone_offset_minutes,
                sync_status: SyncStatus::Pending,
                initiator_device_id: device_id.to_string(),
                modified_at: now,
                created_at: now,
            };

            self.repository.insert_session(&session)?;
            tracing::info!(
                "Started session {} for {} on {}",
                session.id,
                subject_id,
                device_id
            );
            Ok(session)
        })
    }

    /// Close an open session and record its whole-minute duration
    pub fn end_session(&self, session_id: &str) -> Result<SleepSession> {
        let subject_id = self.require_session(session_id)?.subject_id;

        self.with_subject_lock(&subject_id, || {
            let existing = self.require_session(session_id)?;
            if existing.end_time.is_some() {
                return Err(Error::InvalidState(format!(
                    "Session {} is already completed",
                    session_id
                )));
            }

            let now = self.clock.now();
            let updated = SleepSession {
                end_time: Some(now),
                duration_minutes: Some(whole_minutes_between(existing.start_time, now)),
                modified_at: now,
                ..existing.clone()
            };

            self.repository
                .replace_session(&existing, &updated)
                .map_err(|e| match e {
                    Error::InvalidState(_) => Error::InvalidState(format!(
                        "Session {} was ended or edited concurrently",
                        session_id
                    )),
                    other => other,
                })?;
            tracing::info!(
                "Ended session {} after {} min",
                session_id,
                updated.duration_minutes.unwrap_or_default()
            );
            Ok(updated)
        })
    }

    /// Edit start and/or end time; the duration is always recomputed
    ///
    /// A missing argument keeps the stored value.
    pub fn update_session(
        &self,
        session_id: &str,
        new_start_time: Option<DateTime<Utc>>,
        new_end_time: Option<DateTime<Utc>>,
    ) -> Result<SleepSession> {
        let subject_id = self.require_session(session_id)?.subject_id;

        self.with_subject_lock(&subject_id, || {
            let existing = self.require_session(session_id)?;

            let start_time = new_start_time.unwrap_or(existing.start_time);
            let end_time = new_end_time.or(existing.end_time);

            if let Some(end) = end_time {
                if end < start_time {
                    return Err(Error::InvalidArgument(format!(
                        "endTime ({}) must be >= startTime ({})",
                        end, start_time
                    )));
                }
            }

            let updated = SleepSession {
                start_time,
                end_time,
                duration_minutes: end_time.map(|end| whole_minutes_between(start_time, end)),
                modified_at: self.clock.now(),
                ..existing.clone()
            };

            self.repository.replace_session(&existing, &updated)?;
            tracing::info!("Updated session {}", session_id);
            Ok(updated)
        })
    }

    pub fn get_active_session(&self, subject_id: &str) -> Result<Option<SleepSession>> {
        self.repository.get_active_session(subject_id)
    }

    pub fn get_sleep_history(&self, subject_id: &str, days: i64) -> Result<Vec<SleepSession>> {
        self.repository.get_sessions(subject_id, days)
    }

    fn require_session(&self, session_id: &str) -> Result<SleepSession> {
        self.repository
            .get_session(session_id)?
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }
}
