//! Stage menu: what navigation may offer for one target language.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::can_enter;
use crate::content::{Manifest, StageLocation};
use crate::progress::UserProgress;

/// One selectable stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuStage {
    /// Stage number.
    pub number: u32,
    /// Content identifier of the stage document.
    pub cid: String,
    /// Whether the learner may enter it.
    pub accessible: bool,
    /// Whether the resume cursor points here.
    pub current: bool,
}

/// A section and its stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSection {
    /// Section key, as used in stage locations.
    pub key: String,
    /// Display title.
    pub title: String,
    /// Stages in manifest order.
    pub stages: Vec<MenuStage>,
}

/// A level and its sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLevel {
    /// Level key.
    pub key: String,
    /// Sections in manifest order.
    pub sections: Vec<MenuSection>,
}

/// The stage menu of one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMenu {
    /// Language code.
    pub language: String,
    /// Display name, falling back to the code.
    pub name: String,
    /// Levels in key order.
    pub levels: Vec<MenuLevel>,
}

impl StageMenu {
    /// Builds the menu for `language`, else the learner's target language,
    /// else the first language of the manifest.
    ///
    /// Returns `None` when the manifest has no such language.
    #[must_use]
    pub fn build(manifest: &Manifest, progress: &UserProgress, language: Option<&str>) -> Option<Self> {
        let language = language
            .or(progress.target_language.as_deref())
            .or_else(|| manifest.default_language())?;
        let entry = manifest.languages.get(language)?;
        let cursor = progress.cursor();

        let levels = entry
            .levels
            .iter()
            .map(|(level_key, level)| MenuLevel {
                key: level_key.clone(),
                sections: level
                    .sections
                    .iter()
                    .map(|section| MenuSection {
                        key: section.key().to_string(),
                        title: section.title.clone(),
                        stages: section
                            .stages
                            .iter()
                            .map(|stage_ref| {
                                let location =
                                    StageLocation::new(language, level_key.as_str(), section.key(), stage_ref.number);
                                MenuStage {
                                    number: stage_ref.number,
                                    cid: stage_ref.cid.clone(),
                                    accessible: can_enter(progress, &location, stage_ref),
                                    current: cursor.as_ref() == Some(&location),
                                }
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Some(Self {
            language: language.to_string(),
            name: entry.name.clone().unwrap_or_else(|| language.to_string()),
            levels,
        })
    }

    /// Iterates over every stage with its location.
    pub fn stages(&self) -> impl Iterator<Item = (StageLocation, &MenuStage)> + '_ {
        self.levels.iter().flat_map(move |level| {
            level.sections.iter().flat_map(move |section| {
                section.stages.iter().map(move |stage| {
                    (
                        StageLocation::new(self.language.as_str(), level.key.as_str(), section.key.as_str(), stage.number),
                        stage,
                    )
                })
            })
        })
    }
}

impl fmt::Display for StageMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.language)?;
        for level in &self.levels {
            writeln!(f, "  Level {}", level.key)?;
            for section in &level.sections {
                writeln!(f, "    {}", section.title)?;
                for stage in &section.stages {
                    let mark = if stage.accessible { "open" } else { "locked" };
                    let current = if stage.current { "  <- resume" } else { "" };
                    writeln!(f, "      Stage {} [{mark}]{current}", stage.number)?;
                }
            }
        }
        Ok(())
    }
}
