//! Stage access policy and unlock operations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::content::{StageLocation, StageRef};
use crate::progress::UserProgress;

/// Languages for which a stage is locked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    /// Locked language codes.
    pub locked_languages: BTreeSet<String>,
}

impl LockConfig {
    /// Creates a lock configuration from language codes.
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locked_languages: languages.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `language` is locked.
    #[must_use]
    pub fn is_locked(&self, language: &str) -> bool {
        self.locked_languages.contains(language)
    }
}

/// Decides whether a stage is reachable from content metadata alone.
///
/// Stage 1 is always reachable. Every other stage needs a lock configuration
/// that does not name the language; without one they stay closed.
///
/// # Examples
///
/// ```
/// use vox_engine::{is_stage_accessible, LockConfig};
///
/// let es_locked = LockConfig::new(["es"]);
/// assert!(is_stage_accessible(1, "es", None));
/// assert!(!is_stage_accessible(2, "es", Some(&es_locked)));
/// assert!(is_stage_accessible(2, "fr", Some(&es_locked)));
/// assert!(!is_stage_accessible(2, "fr", None));
/// ```
#[must_use]
pub fn is_stage_accessible(stage: u32, language: &str, lock: Option<&LockConfig>) -> bool {
    if stage == 1 {
        return true;
    }
    lock.is_some_and(|lock| !lock.is_locked(language))
}

/// Returns `true` if the learner may enter the stage at `location`.
///
/// Content policy, a language-wide unlock, or a per-stage unlock each
/// suffice on their own.
#[must_use]
pub fn can_enter(progress: &UserProgress, location: &StageLocation, stage_ref: &StageRef) -> bool {
    let lock = stage_ref.lock_config(&location.language);
    is_stage_accessible(location.stage, &location.language, lock.as_ref())
        || progress.unlocked_languages.contains(&location.language)
        || progress.is_stage_unlocked(location)
}

/// Unlocks every stage of `language`. Returns `true` if this changed
/// anything.
pub fn unlock_language(progress: &mut UserProgress, language: &str) -> bool {
    let changed = progress.unlocked_languages.insert(language.to_string());
    if changed {
        progress.touch();
    }
    changed
}

/// Unlocks one stage. Returns `true` if this changed anything.
pub fn unlock_stage(progress: &mut UserProgress, location: &StageLocation) -> bool {
    let changed = progress
        .unlocked_stages
        .entry(location.language.clone())
        .or_default()
        .entry(location.level.clone())
        .or_default()
        .entry(location.section.clone())
        .or_default()
        .insert(location.stage);
    if changed {
        progress.touch();
    }
    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage_ref(number: u32, is_free: Option<bool>, locked: Option<&[&str]>) -> StageRef {
        StageRef {
            number,
            cid: format!("cid{number}"),
            is_free,
            locked_languages: locked.map(|l| l.iter().map(ToString::to_string).collect()),
        }
    }

    #[test]
    fn test_stage_one_always_accessible() {
        let everything = LockConfig::new(["es", "fr", "de"]);
        for lang in ["es", "fr", "xx", ""] {
            assert!(is_stage_accessible(1, lang, None));
            assert!(is_stage_accessible(1, lang, Some(&everything)));
        }
    }

    #[test]
    fn test_locking_is_per_language() {
        let es = LockConfig::new(["es"]);
        assert!(!is_stage_accessible(2, "es", Some(&es)));
        assert!(is_stage_accessible(2, "fr", Some(&es)));
        assert!(is_stage_accessible(5, "fr", Some(&LockConfig::default())));
    }

    #[test]
    fn test_missing_lock_config_fails_closed() {
        assert!(!is_stage_accessible(2, "es", None));
        assert!(!is_stage_accessible(10, "fr", None));
    }

    #[test]
    fn test_stage_zero_is_not_free() {
        assert!(!is_stage_accessible(0, "es", None));
        assert!(is_stage_accessible(0, "fr", Some(&LockConfig::new(["es"]))));

        let location = StageLocation::new("es", "A1", "basics", 0);
        let progress = UserProgress::default();
        assert!(!can_enter(&progress, &location, &stage_ref(0, Some(false), None)));
    }

    #[test]
    fn test_can_enter_with_policy() {
        let progress = UserProgress::default();
        let free = stage_ref(2, Some(true), None);
        let paid = stage_ref(2, Some(false), None);
        let location = StageLocation::new("es", "A1", "Basics", 2);

        assert!(can_enter(&progress, &location, &free));
        assert!(!can_enter(&progress, &location, &paid));
    }

    #[test]
    fn test_can_enter_after_stage_unlock() {
        let mut progress = UserProgress::default();
        let paid = stage_ref(2, Some(false), None);
        let location = StageLocation::new("es", "A1", "Basics", 2);

        assert!(unlock_stage(&mut progress, &location));
        assert!(can_enter(&progress, &location, &paid));

        let other_section = StageLocation::new("es", "A1", "Food", 2);
        assert!(!can_enter(&progress, &other_section, &paid));
    }

    #[test]
    fn test_can_enter_after_language_unlock() {
        let mut progress = UserProgress::default();
        let locked = stage_ref(3, None, Some(&["fr"]));
        let location = StageLocation::new("fr", "A1", "Basics", 3);

        assert!(!can_enter(&progress, &location, &locked));
        assert!(unlock_language(&mut progress, "fr"));
        assert!(can_enter(&progress, &location, &locked));
    }

    #[test]
    fn test_unlocks_are_idempotent() {
        let mut progress = UserProgress::default();
        let location = StageLocation::new("es", "A1", "Basics", 2);

        assert!(unlock_stage(&mut progress, &location));
        assert!(!unlock_stage(&mut progress, &location));
        assert!(unlock_language(&mut progress, "es"));
        assert!(!unlock_language(&mut progress, "es"));

        let stages = &progress.unlocked_stages["es"]["A1"]["Basics"];
        assert_eq!(stages.len(), 1);
    }
}
