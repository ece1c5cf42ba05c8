//! Learner progress and its persistence.
//!
//! Progress is write-through: every mutation is saved immediately by the
//! caller. Loading never fails. Absent or unreadable state simply yields
//! fresh defaults so a corrupt file can never lock a learner out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::StageLocation;
use crate::error::{Result, VoxError};

/// Stage numbers unlocked per language, level, and section.
pub type UnlockedStages = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeSet<u32>>>>;

/// Everything the player remembers about a learner between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProgress {
    /// Language being learned.
    pub target_language: Option<String>,

    /// Language translations are shown in.
    pub translation_language: Option<String>,

    /// Level of the resume cursor.
    pub level: Option<String>,

    /// Section of the resume cursor.
    pub section: Option<String>,

    /// Stage of the resume cursor.
    pub stage: Option<u32>,

    /// Exercise index of the resume cursor.
    pub exercise_index: usize,

    /// Languages with every stage unlocked.
    pub unlocked_languages: BTreeSet<String>,

    /// Individually unlocked stages.
    pub unlocked_stages: UnlockedStages,

    /// When the progress was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            target_language: None,
            translation_language: None,
            level: None,
            section: None,
            stage: None,
            exercise_index: 0,
            unlocked_languages: BTreeSet::new(),
            unlocked_stages: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl UserProgress {
    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns `true` if the stage at `location` was unlocked individually.
    #[must_use]
    pub fn is_stage_unlocked(&self, location: &StageLocation) -> bool {
        self.unlocked_stages
            .get(&location.language)
            .and_then(|levels| levels.get(&location.level))
            .and_then(|sections| sections.get(&location.section))
            .is_some_and(|stages| stages.contains(&location.stage))
    }

    /// Points the resume cursor at an exercise.
    pub fn set_cursor(&mut self, location: &StageLocation, exercise_index: usize) {
        self.target_language = Some(location.language.clone());
        self.level = Some(location.level.clone());
        self.section = Some(location.section.clone());
        self.stage = Some(location.stage);
        self.exercise_index = exercise_index;
        self.touch();
    }

    /// The stage the resume cursor points at, if it names one completely.
    #[must_use]
    pub fn cursor(&self) -> Option<StageLocation> {
        Some(StageLocation::new(
            self.target_language.clone()?,
            self.level.clone()?,
            self.section.clone()?,
            self.stage?,
        ))
    }
}

/// Durable storage for [`UserProgress`].
pub trait ProgressStore: Send + Sync {
    /// Loads stored progress, falling back to defaults.
    fn load(&self) -> UserProgress;

    /// Stores progress, replacing whatever was there.
    fn save(&self, progress: &UserProgress) -> Result<()>;

    /// Forgets all stored progress.
    fn reset(&self) -> Result<()>;
}

/// Stores progress as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. Nothing is touched until the
    /// first load or save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the progress file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self) -> UserProgress {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored progress, starting fresh");
                return UserProgress::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read progress, starting fresh");
                return UserProgress::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Stored progress is corrupt, starting fresh");
            UserProgress::default()
        })
    }

    fn save(&self, progress: &UserProgress) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| VoxError::persistence(&self.path, e))?;
        }

        let json = serde_json::to_string_pretty(progress)?;
        let temp = self.temp_path();
        std::fs::write(&temp, json).map_err(|e| VoxError::persistence(&self.path, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| VoxError::persistence(&self.path, e))?;

        debug!(path = %self.path.display(), "Progress saved");
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VoxError::persistence(&self.path, e)),
        }
    }
}

/// Keeps progress in memory. Counts saves so tests can assert on
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    progress: Option<UserProgress>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `progress`.
    #[must_use]
    pub fn with_progress(progress: UserProgress) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                progress: Some(progress),
                ..MemoryInner::default()
            }),
        }
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).saves
    }

    /// The last saved progress, if any.
    #[must_use]
    pub fn stored(&self) -> Option<UserProgress> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .progress
            .clone()
    }

    /// Makes every following save fail, to exercise error paths.
    pub fn fail_saves(&self, fail: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_saves = fail;
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self) -> UserProgress {
        self.stored().unwrap_or_default()
    }

    fn save(&self, progress: &UserProgress) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.fail_saves {
            return Err(VoxError::persistence("<memory>", "store is read-only"));
        }
        inner.progress = Some(progress.clone());
        inner.saves += 1;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .progress = None;
        Ok(())
    }
}
