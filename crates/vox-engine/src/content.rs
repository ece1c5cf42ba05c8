//! Content model: manifest, stages, and exercises.
//!
//! All content is immutable once parsed. Identifiers that point at other
//! content (stage `cid`s, media references) stay opaque strings and are
//! only ever resolved through the content fetcher.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::access::LockConfig;
use crate::error::{Result, VoxError};

// ============================================================================
// Exercise types
// ============================================================================

/// The closed set of exercise types the player can present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    /// Pick one option.
    MultipleChoice,
    /// Fill a blank by picking an option, then check.
    TapFill,
    /// Say the prompt out loud.
    Pronunciation,
    /// Flip a card and confirm.
    Flashcard,
    /// Assemble a sentence from a word bank.
    SentenceOrder,
    /// Pair left items with right items.
    Matching,
    /// Listen to audio, then pick one option.
    Listening,
}

impl ExerciseKind {
    /// Every exercise kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::MultipleChoice,
        Self::TapFill,
        Self::Pronunciation,
        Self::Flashcard,
        Self::SentenceOrder,
        Self::Matching,
        Self::Listening,
    ];

    /// Parses a content type tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use vox_engine::ExerciseKind;
    ///
    /// assert_eq!(ExerciseKind::from_tag("tap_fill"), Some(ExerciseKind::TapFill));
    /// assert_eq!(ExerciseKind::from_tag("sentence_ordering"), Some(ExerciseKind::SentenceOrder));
    /// assert_eq!(ExerciseKind::from_tag("essay"), None);
    /// ```
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "multiple_choice" => Some(Self::MultipleChoice),
            "tap_fill" => Some(Self::TapFill),
            "pronunciation" => Some(Self::Pronunciation),
            "flashcard" => Some(Self::Flashcard),
            "sentence_order" | "sentence_ordering" => Some(Self::SentenceOrder),
            "matching" => Some(Self::Matching),
            "listening" => Some(Self::Listening),
            _ => None,
        }
    }

    /// The canonical content tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::TapFill => "tap_fill",
            Self::Pronunciation => "pronunciation",
            Self::Flashcard => "flashcard",
            Self::SentenceOrder => "sentence_order",
            Self::Matching => "matching",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declared type of an exercise.
///
/// Unknown tags are kept rather than rejected so that one bad exercise does
/// not make a whole stage unreadable; dispatch reports them when mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseType {
    /// A type the player knows how to present.
    Known(ExerciseKind),
    /// An unrecognized tag.
    Unknown(String),
}

impl ExerciseType {
    /// Returns the known kind, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<ExerciseKind> {
        match self {
            Self::Known(kind) => Some(*kind),
            Self::Unknown(_) => None,
        }
    }

    /// The tag as it appeared in content.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Known(kind) => kind.as_str(),
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<ExerciseKind> for ExerciseType {
    fn from(kind: ExerciseKind) -> Self {
        Self::Known(kind)
    }
}

impl<'de> Deserialize<'de> for ExerciseType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(ExerciseKind::from_tag(&tag).map_or(Self::Unknown(tag), Self::Known))
    }
}

impl Serialize for ExerciseType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.tag())
    }
}

// ============================================================================
// Exercise
// ============================================================================

/// Accepts a string or a number and keeps it as an opaque string.
fn opaque_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

/// One left/right pair of a matching exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    /// Left column item.
    pub left: String,
    /// Right column item.
    pub right: String,
}

impl Pair {
    /// Creates a pair.
    #[must_use]
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// The pairs of a matching exercise.
///
/// Content may express them as an object (`{"perro": "dog"}`), a list of
/// two-element arrays, or a list of `{left, right}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PairsRepr")]
pub struct Pairs(pub Vec<Pair>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PairsRepr {
    Map(BTreeMap<String, String>),
    List(Vec<PairRepr>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PairRepr {
    Tuple(String, String),
    Object(Pair),
}

impl From<PairsRepr> for Pairs {
    fn from(repr: PairsRepr) -> Self {
        match repr {
            PairsRepr::Map(map) => Self(map.into_iter().map(|(l, r)| Pair::new(l, r)).collect()),
            PairsRepr::List(list) => Self(
                list.into_iter()
                    .map(|p| match p {
                        PairRepr::Tuple(l, r) => Pair::new(l, r),
                        PairRepr::Object(pair) => pair,
                    })
                    .collect(),
            ),
        }
    }
}

impl Pairs {
    /// Returns `true` if `left` and `right` belong together.
    #[must_use]
    pub fn matches(&self, left: &str, right: &str) -> bool {
        self.0.iter().any(|p| p.left == left && p.right == right)
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Media attached to an exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Image reference (URL, path, or content-addressed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Audio reference (URL, path, or content-addressed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// A single exercise. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Identifier, also the key into translation files.
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: String,

    /// Declared exercise type.
    #[serde(rename = "type")]
    pub kind: ExerciseType,

    /// Prompt text. Tap-fill questions mark the blank with `___`.
    #[serde(default)]
    pub question: String,

    /// Options or word bank, in content order.
    #[serde(default)]
    pub options: Vec<String>,

    /// Expected answer: a string, or a sequence for ordering exercises.
    #[serde(default)]
    pub answer: Value,

    /// Pairs for matching exercises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Pairs>,

    /// Attached media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,

    /// Recognition language override for pronunciation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_lang: Option<String>,

    /// Languages for which this content is locked beyond stage 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_languages: Option<BTreeSet<String>>,
}

impl Exercise {
    /// Creates an exercise with the given id, kind, and question and no
    /// options or answer.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<ExerciseType>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            question: question.into(),
            options: Vec::new(),
            answer: Value::Null,
            pairs: None,
            media: None,
            voice_lang: None,
            locked_languages: None,
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected answer.
    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<Value>) -> Self {
        self.answer = answer.into();
        self
    }

    /// Sets the matching pairs.
    #[must_use]
    pub fn with_pairs(mut self, pairs: Vec<Pair>) -> Self {
        self.pairs = Some(Pairs(pairs));
        self
    }

    /// Sets the attached media.
    #[must_use]
    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    /// Sets the recognition language override.
    #[must_use]
    pub fn with_voice_lang(mut self, lang: impl Into<String>) -> Self {
        self.voice_lang = Some(lang.into());
        self
    }

    /// Returns a description of content problems that will stop this
    /// exercise from being answerable, or `None` if it looks playable.
    #[must_use]
    pub fn lint(&self) -> Option<String> {
        let kind = match &self.kind {
            ExerciseType::Known(kind) => *kind,
            ExerciseType::Unknown(tag) => return Some(format!("unknown type '{tag}'")),
        };
        match kind {
            ExerciseKind::MultipleChoice | ExerciseKind::Listening | ExerciseKind::TapFill
                if self.options.is_empty() =>
            {
                Some("no options to choose from".to_string())
            }
            ExerciseKind::MultipleChoice | ExerciseKind::TapFill | ExerciseKind::Pronunciation
                if !self.answer.is_string() =>
            {
                Some("answer should be a string".to_string())
            }
            ExerciseKind::SentenceOrder if self.options.is_empty() && !has_word_source(&self.answer) => {
                Some("no word bank: provide options, a sentence, or an array answer".to_string())
            }
            ExerciseKind::Matching if self.pairs.as_ref().map_or(true, Pairs::is_empty) => {
                Some("no pairs to match".to_string())
            }
            ExerciseKind::Listening
                if self.media.as_ref().and_then(|m| m.audio.as_ref()).is_none() =>
            {
                Some("no audio reference".to_string())
            }
            _ => None,
        }
    }
}

/// A sentence-order answer the word bank can be built from.
fn has_word_source(answer: &Value) -> bool {
    match answer {
        Value::String(sentence) => !sentence.trim().is_empty(),
        Value::Array(_) => true,
        _ => false,
    }
}

// ============================================================================
// Stage
// ============================================================================

/// A fetched stage: an ordered, fixed list of exercises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage identifier as given by the content.
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: String,

    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Whether the stage is free for every language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,

    /// Languages for which the stage is locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_languages: Option<BTreeSet<String>>,

    /// Exercises in presentation order.
    pub exercises: Vec<Exercise>,
}

impl Stage {
    /// Parses a stage from fetched JSON.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::ContentParse` if the document is not a stage.
    pub fn from_value(identifier: &str, value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| VoxError::content_parse(identifier, e))
    }

    /// Lock configuration carried by the stage payload itself.
    ///
    /// Stage-level `lockedLanguages` wins; otherwise the union of the
    /// exercises' `lockedLanguages`. `None` when the payload says nothing.
    #[must_use]
    pub fn lock_config(&self) -> Option<LockConfig> {
        if let Some(locked) = &self.locked_languages {
            return Some(LockConfig::new(locked.iter().cloned()));
        }
        let mut any = false;
        let mut locked = BTreeSet::new();
        for exercise in &self.exercises {
            if let Some(langs) = &exercise.locked_languages {
                any = true;
                locked.extend(langs.iter().cloned());
            }
        }
        any.then(|| LockConfig::new(locked))
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Reference to a stage from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRef {
    /// Stage number within its section (1-based).
    #[serde(rename = "id")]
    pub number: u32,

    /// Content identifier of the stage document.
    pub cid: String,

    /// Whether the stage is free for every language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,

    /// Languages for which the stage is locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_languages: Option<BTreeSet<String>>,
}

impl StageRef {
    /// Derives the lock configuration of this stage for `language`.
    ///
    /// Explicit `lockedLanguages` win. Otherwise `isFree: true` means no
    /// language is locked and `isFree: false` locks the current language.
    /// Without either, returns `None`.
    #[must_use]
    pub fn lock_config(&self, language: &str) -> Option<LockConfig> {
        if let Some(locked) = &self.locked_languages {
            return Some(LockConfig::new(locked.iter().cloned()));
        }
        match self.is_free {
            Some(true) => Some(LockConfig::default()),
            Some(false) => Some(LockConfig::new([language.to_string()])),
            None => None,
        }
    }
}

/// A section of a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    /// Stable section key. Falls back to the title when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Stages in order.
    #[serde(default)]
    pub stages: Vec<StageRef>,
}

impl SectionEntry {
    /// The key used in progress records and stage locations.
    #[must_use]
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.title)
    }
}

/// A level (e.g. a CEFR level) of a language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEntry {
    /// Sections in order.
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
}

/// Metadata of one target language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Levels keyed by level name.
    #[serde(default)]
    pub levels: BTreeMap<String, LevelEntry>,
}

/// Top-level content catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Languages keyed by language code.
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageEntry>,
}

impl Manifest {
    /// Parses a manifest from fetched JSON.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::ContentParse` if the document is not a manifest.
    pub fn from_value(identifier: &str, value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| VoxError::content_parse(identifier, e))
    }

    /// Finds the section a location points into.
    #[must_use]
    pub fn section(&self, location: &StageLocation) -> Option<&SectionEntry> {
        self.languages
            .get(&location.language)?
            .levels
            .get(&location.level)?
            .sections
            .iter()
            .find(|s| s.key() == location.section)
    }

    /// Finds the stage reference a location points at.
    #[must_use]
    pub fn stage(&self, location: &StageLocation) -> Option<&StageRef> {
        self.section(location)?
            .stages
            .iter()
            .find(|s| s.number == location.stage)
    }

    /// Returns the first language code, used when the learner has not
    /// chosen one yet.
    #[must_use]
    pub fn default_language(&self) -> Option<&str> {
        self.languages.keys().next().map(String::as_str)
    }
}

/// Position of a stage in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageLocation {
    /// Target language code.
    pub language: String,
    /// Level key.
    pub level: String,
    /// Section key.
    pub section: String,
    /// Stage number (1-based).
    pub stage: u32,
}

impl StageLocation {
    /// Creates a stage location.
    #[must_use]
    pub fn new(
        language: impl Into<String>,
        level: impl Into<String>,
        section: impl Into<String>,
        stage: u32,
    ) -> Self {
        Self {
            language: language.into(),
            level: level.into(),
            section: section.into(),
            stage,
        }
    }

    /// Builds a `StageLocked` error for this location.
    #[must_use]
    pub fn locked(&self) -> VoxError {
        VoxError::StageLocked {
            language: self.language.clone(),
            level: self.level.clone(),
            section: self.section.clone(),
            stage: self.stage,
        }
    }

    /// Builds a `StageNotFound` error for this location.
    #[must_use]
    pub fn not_found(&self) -> VoxError {
        VoxError::StageNotFound {
            language: self.language.clone(),
            level: self.level.clone(),
            section: self.section.clone(),
            stage: self.stage,
        }
    }
}

impl fmt::Display for StageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}#{}",
            self.language, self.level, self.section, self.stage
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn manifest_json() -> Value {
        json!({
            "languages": {
                "es": {
                    "name": "Español",
                    "levels": {
                        "A1": {
                            "sections": [{
                                "title": "Basics",
                                "stages": [
                                    { "id": 1, "cid": "cid1", "isFree": true },
                                    { "id": 2, "cid": "QmStage2", "isFree": false },
                                    { "id": 3, "cid": "QmStage3", "lockedLanguages": ["fr"] }
                                ]
                            }]
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_exercise_kind_tags_round_trip() {
        for kind in ExerciseKind::ALL {
            assert_eq!(ExerciseKind::from_tag(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_exercise_type_is_kept() {
        let exercise: Exercise =
            serde_json::from_value(json!({ "id": "e1", "type": "essay", "question": "Write" }))
                .unwrap();
        assert_eq!(exercise.kind, ExerciseType::Unknown("essay".to_string()));
        assert_eq!(exercise.kind.tag(), "essay");
        assert_eq!(exercise.lint().as_deref(), Some("unknown type 'essay'"));
    }

    #[test]
    fn test_exercise_numeric_id_and_defaults() {
        let exercise: Exercise =
            serde_json::from_value(json!({ "id": 7, "type": "flashcard", "question": "Hola" }))
                .unwrap();
        assert_eq!(exercise.id, "7");
        assert!(exercise.options.is_empty());
        assert!(exercise.answer.is_null());
        assert!(exercise.pairs.is_none());
    }

    #[test]
    fn test_exercise_camel_case_fields() {
        let exercise: Exercise = serde_json::from_value(json!({
            "id": "p1",
            "type": "pronunciation",
            "question": "Buenos días",
            "answer": "buenos días",
            "voiceLang": "es-ES",
            "lockedLanguages": ["es"],
            "media": { "image": "ipfs://QmImage" }
        }))
        .unwrap();
        assert_eq!(exercise.voice_lang.as_deref(), Some("es-ES"));
        assert!(exercise.locked_languages.unwrap().contains("es"));
        assert_eq!(exercise.media.unwrap().image.as_deref(), Some("ipfs://QmImage"));
    }

    #[test]
    fn test_pairs_from_map_list_and_objects() {
        let from_map: Pairs = serde_json::from_value(json!({ "perro": "dog", "gato": "cat" })).unwrap();
        assert_eq!(from_map.len(), 2);
        assert!(from_map.matches("perro", "dog"));

        let from_tuples: Pairs = serde_json::from_value(json!([["uno", "one"], ["dos", "two"]])).unwrap();
        assert!(from_tuples.matches("dos", "two"));
        assert!(!from_tuples.matches("dos", "one"));

        let from_objects: Pairs =
            serde_json::from_value(json!([{ "left": "rojo", "right": "red" }])).unwrap();
        assert_eq!(from_objects.0, vec![Pair::new("rojo", "red")]);
    }

    #[test]
    fn test_stage_requires_exercises() {
        let err = Stage::from_value("cid1", json!({ "id": 1 })).unwrap_err();
        assert!(matches!(err, VoxError::ContentParse { .. }));
    }

    #[test]
    fn test_stage_lock_config_from_exercises() {
        let stage = Stage::from_value(
            "cid1",
            json!({
                "id": "s2",
                "exercises": [
                    { "id": "a", "type": "flashcard", "lockedLanguages": ["es"] },
                    { "id": "b", "type": "flashcard", "lockedLanguages": ["de"] },
                    { "id": "c", "type": "flashcard" }
                ]
            }),
        )
        .unwrap();
        let lock = stage.lock_config().unwrap();
        assert!(lock.is_locked("es"));
        assert!(lock.is_locked("de"));
        assert!(!lock.is_locked("fr"));
    }

    #[test]
    fn test_stage_without_lock_metadata() {
        let stage = Stage::from_value(
            "cid1",
            json!({ "exercises": [{ "id": "a", "type": "flashcard" }] }),
        )
        .unwrap();
        assert!(stage.lock_config().is_none());
    }

    #[test]
    fn test_manifest_lookup() {
        let manifest = Manifest::from_value("manifest", manifest_json()).unwrap();
        let location = StageLocation::new("es", "A1", "Basics", 2);

        let stage = manifest.stage(&location).unwrap();
        assert_eq!(stage.cid, "QmStage2");
        assert_eq!(manifest.default_language(), Some("es"));

        let missing = StageLocation::new("es", "A1", "Basics", 9);
        assert!(manifest.stage(&missing).is_none());
    }

    #[test]
    fn test_stage_ref_lock_config() {
        let manifest = Manifest::from_value("manifest", manifest_json()).unwrap();
        let section = manifest
            .section(&StageLocation::new("es", "A1", "Basics", 1))
            .unwrap();

        assert!(!section.stages[0].lock_config("es").unwrap().is_locked("es"));
        assert!(section.stages[1].lock_config("es").unwrap().is_locked("es"));
        let explicit = section.stages[2].lock_config("es").unwrap();
        assert!(explicit.is_locked("fr"));
        assert!(!explicit.is_locked("es"));

        let bare = StageRef {
            number: 4,
            cid: "x".to_string(),
            is_free: None,
            locked_languages: None,
        };
        assert!(bare.lock_config("es").is_none());
    }

    #[test]
    fn test_section_key_prefers_id() {
        let section = SectionEntry {
            id: Some("greetings".to_string()),
            title: "Greetings".to_string(),
            stages: vec![],
        };
        assert_eq!(section.key(), "greetings");
    }

    #[test]
    fn test_stage_location_display() {
        let location = StageLocation::new("fr", "A2", "Food", 3);
        assert_eq!(location.to_string(), "fr/A2/Food#3");
    }

    #[test]
    fn test_lint_flags_missing_content() {
        let mc = Exercise::new("m", ExerciseKind::MultipleChoice, "Pick").with_answer("a");
        assert_eq!(mc.lint().as_deref(), Some("no options to choose from"));

        let matching = Exercise::new("x", ExerciseKind::Matching, "Match");
        assert_eq!(matching.lint().as_deref(), Some("no pairs to match"));

        let ok = Exercise::new("f", ExerciseKind::Flashcard, "Hola");
        assert!(ok.lint().is_none());
    }

    #[test]
    fn test_lint_sentence_word_bank_sources() {
        let sentence = Exercise::new("s", ExerciseKind::SentenceOrder, "Order").with_answer("yo soy feliz");
        assert!(sentence.lint().is_none());

        let words = Exercise::new("w", ExerciseKind::SentenceOrder, "Order").with_answer(json!(["yo", "soy"]));
        assert!(words.lint().is_none());

        let blank = Exercise::new("b", ExerciseKind::SentenceOrder, "Order").with_answer("  ");
        assert_eq!(
            blank.lint().as_deref(),
            Some("no word bank: provide options, a sentence, or an array answer")
        );
    }
}
