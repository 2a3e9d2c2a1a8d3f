//! Baby profile persistence with file locking.
//!
//! Profiles and the active-profile pointer are kept in a single JSON file,
//! read under a shared lock and replaced atomically on save.

use crate::{BabyProfile, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// All known profiles plus the one commands default to
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProfileBook {
    pub profiles: Vec<BabyProfile>,
    pub active_profile_id: Option<String>,
}

impl ProfileBook {
    /// Load profiles from a file with shared locking
    ///
    /// Returns an empty book if the file doesn't exist.
    /// If the file is unreadable or corrupted, logs a warning and returns an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No profile file found, starting with no profiles");
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open profile file {:?}: {}. Using defaults.", path, e);
                return Ok(Self::default());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock profile file {:?}: {}. Using defaults.", path, e);
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read profile file {:?}: {}. Using defaults.", path, e);
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<ProfileBook>(&contents) {
            Ok(book) => {
                tracing::debug!("Loaded {} profiles from {:?}", book.profiles.len(), path);
                Ok(book)
            }
            Err(e) => {
                tracing::warn!("Failed to parse profile file {:?}: {}. Using defaults.", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Save profiles through a locked temp file renamed over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config(format!("profile path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} profiles to {:?}", self.profiles.len(), path);
        Ok(())
    }

    /// Load, modify and save back
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut ProfileBook) -> Result<()>,
    {
        let mut book = Self::load(path)?;
        f(&mut book)?;
        book.save(path)?;
        Ok(book)
    }

    /// Add a profile; the first profile added becomes active
    pub fn add(
        &mut self,
        id: String,
        name: String,
        birthdate: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<&BabyProfile> {
        if self.profiles.iter().any(|p| p.id == id) {
            return Err(Error::InvalidArgument(format!("profile {} already exists", id)));
        }
        if birthdate > created_at.date_naive() {
            return Err(Error::InvalidArgument(format!(
                "birthdate {} is in the future",
                birthdate
            )));
        }

        if self.active_profile_id.is_none() {
            self.active_profile_id = Some(id.clone());
        }
        self.profiles.push(BabyProfile {
            id,
            name,
            birthdate,
            created_at,
        });

        let added = self.profiles.len() - 1;
        Ok(&self.profiles[added])
    }

    pub fn get(&self, id: &str) -> Option<&BabyProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn active(&self) -> Option<&BabyProfile> {
        self.active_profile_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::InvalidArgument(format!("unknown profile {}", id)));
        }
        self.active_profile_id = Some(id.to_string());
        Ok(())
    }
}
