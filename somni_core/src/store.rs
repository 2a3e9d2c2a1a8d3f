//! JSON Lines session store.
//!
//! Sessions live one per line in a `.jsonl` file. Every mutation runs under an
//! exclusive lock on a sidecar `.lock` file and rewrites the data file through a
//! temp file + rename, so readers and crashed writers only ever see a complete
//! snapshot. Readers take a shared lock on the same sidecar.

use crate::repository::{check_insert, check_replace, history_cutoff, recent_for_subject};
use crate::{Error, Repository, Result, SleepSession, SyncStatus, TimeProvider};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// File-backed [`Repository`]
pub struct JsonlRepository {
    path: PathBuf,
    lock_path: PathBuf,
    clock: Arc<dyn TimeProvider>,
}

impl JsonlRepository {
    /// Store sessions at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn TimeProvider>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("jsonl.lock");
        Self {
            path,
            lock_path,
            clock,
        }
    }

    /// Every stored session, in file order
    pub fn all_sessions(&self) -> Result<Vec<SleepSession>> {
        let lock = self.open_lock_file()?;
        lock.lock_shared()?;
        let sessions = read_sessions(&self.path);
        lock.unlock()?;
        sessions
    }

    fn open_lock_file(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    /// Read, modify and atomically rewrite the store under the writer lock
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<SleepSession>) -> Result<T>,
    {
        let lock = self.open_lock_file()?;
        lock.lock_exclusive()?;

        let result = read_sessions(&self.path).and_then(|mut sessions| {
            let value = f(&mut sessions)?;
            write_sessions(&self.path, &sessions)?;
            Ok(value)
        });

        lock.unlock()?;
        result
    }
}

impl Repository for JsonlRepository {
    fn get_sessions(&self, subject_id: &str, days: i64) -> Result<Vec<SleepSession>> {
        let cutoff = history_cutoff(self.clock.now(), days);
        Ok(recent_for_subject(self.all_sessions()?, subject_id, cutoff))
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SleepSession>> {
        Ok(self
            .all_sessions()?
            .into_iter()
            .find(|s| s.id == session_id))
    }

    fn get_active_session(&self, subject_id: &str) -> Result<Option<SleepSession>> {
        Ok(self
            .all_sessions()?
            .into_iter()
            .find(|s| s.subject_id == subject_id && s.is_active()))
    }

    fn insert_session(&self, session: &SleepSession) -> Result<()> {
        self.mutate(|sessions| {
            check_insert(sessions, session)?;
            sessions.push(session.clone());
            Ok(())
        })?;
        tracing::debug!("Inserted session {} into {:?}", session.id, self.path);
        Ok(())
    }

    fn update_session(&self, session: &SleepSession) -> Result<()> {
        self.mutate(|sessions| {
            let stored = sessions
                .iter_mut()
                .find(|s| s.id == session.id)
                .ok_or_else(|| Error::NotFound(session.id.clone()))?;
            *stored = session.clone();
            Ok(())
        })?;
        tracing::debug!("Updated session {} in {:?}", session.id, self.path);
        Ok(())
    }

    fn replace_session(&self, current: &SleepSession, updated: &SleepSession) -> Result<()> {
        self.mutate(|sessions| {
            let index = sessions.iter().position(|s| s.id == current.id);
            check_replace(index.map(|i| &sessions[i]), current)?;
            if let Some(i) = index {
                sessions[i] = updated.clone();
            }
            Ok(())
        })?;
        tracing::debug!("Replaced session {} in {:?}", current.id, self.path);
        Ok(())
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        let removed = self.mutate(|sessions| {
            let before = sessions.len();
            sessions.retain(|s| s.id != session_id);
            Ok(before - sessions.len())
        })?;
        tracing::debug!("Deleted {} session(s) with id {}", removed, session_id);
        Ok(())
    }

    fn get_pending_sync_sessions(&self) -> Result<Vec<SleepSession>> {
        let mut pending: Vec<_> = self
            .all_sessions()?
            .into_iter()
            .filter(|s| s.sync_status == SyncStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.modified_at.cmp(&b.modified_at));
        Ok(pending)
    }

    fn mark_synced(&self, session_id: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.mutate(|sessions| {
            let stored = sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
            stored.sync_status = SyncStatus::Synced;
            stored.modified_at = synced_at;
            Ok(())
        })
    }
}

/// Read all sessions from a JSONL file, skipping lines that fail to parse
pub fn read_sessions(path: &Path) -> Result<Vec<SleepSession>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(&file);
    let mut sessions = Vec::new();

    for (line_num, line_result) in reader.split(b'\n').enumerate() {
        let line = line_result?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<SleepSession>(&line) {
            Ok(session) => sessions.push(session),
            Err(e) => {
                tracing::warn!("Failed to parse session at line {}: {}", line_num + 1, e);
            }
        }
    }

    tracing::debug!("Read {} sessions from {:?}", sessions.len(), path);
    Ok(sessions)
}

/// Replace the file contents with `sessions` via temp file + rename
fn write_sessions(path: &Path, sessions: &[SleepSession]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Persistence(format!("store path {:?} has no parent", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        for session in sessions {
            let line = serde_json::to_string(session)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
