//! Per-type exercise strategies and the dispatch that picks one.
//!
//! A strategy owns the transient interaction state of one mounted exercise
//! (selection, assembled words, matched pairs) and every control
//! subscription it made. It never judges a raw answer: it reports an
//! [`Elicitation`] and the engine decides.

mod choice;
mod flashcard;
mod matching;
mod pronunciation;
mod sentence;
mod tap_fill;

pub use choice::ChoiceStrategy;
pub use flashcard::FlashcardStrategy;
pub use matching::MatchingStrategy;
pub use pronunciation::PronunciationStrategy;
pub use sentence::SentenceStrategy;
pub use tap_fill::TapFillStrategy;

use std::time::Duration;

use rand::rngs::StdRng;
use serde_json::Value;
use vox_content::MediaResolver;

use crate::content::{Exercise, ExerciseKind, ExerciseType};
use crate::error::{Result, VoxError};
use crate::view::{Control, ExerciseView, ListenerId, MountPoint, View, ViewBody};

/// Recognition language used when nothing else names one.
pub const DEFAULT_VOICE_LANGUAGE: &str = "en-US";

/// Session-level facts strategies may depend on.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Language being learned.
    pub target_language: Option<String>,
    /// Recognition language of last resort.
    pub fallback_voice_language: String,
    /// Resolves media references to URLs.
    pub media: MediaResolver,
    /// How long a mismatched pair stays marked.
    pub mismatch_revert: Duration,
}

impl RenderContext {
    /// Creates a context with no target language.
    #[must_use]
    pub fn new(media: MediaResolver) -> Self {
        Self {
            target_language: None,
            fallback_voice_language: DEFAULT_VOICE_LANGUAGE.to_string(),
            media,
            mismatch_revert: Duration::from_millis(600),
        }
    }

    /// Sets the target language.
    #[must_use]
    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    /// Sets the mismatch revert delay.
    #[must_use]
    pub const fn with_mismatch_revert(mut self, delay: Duration) -> Self {
        self.mismatch_revert = delay;
        self
    }

    /// Sets the recognition language of last resort.
    #[must_use]
    pub fn with_fallback_voice_language(mut self, language: impl Into<String>) -> Self {
        self.fallback_voice_language = language.into();
        self
    }

    /// Recognition language for `exercise`: its own `voiceLang`, else the
    /// target language, else the fallback.
    #[must_use]
    pub fn voice_language(&self, exercise: &Exercise) -> String {
        exercise
            .voice_lang
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .or(self.target_language.as_deref())
            .unwrap_or(self.fallback_voice_language.as_str())
            .to_string()
    }

    fn image(&self, exercise: &Exercise) -> Option<String> {
        exercise
            .media
            .as_ref()
            .and_then(|m| m.image.as_deref())
            .and_then(|r| self.media.resolve(r))
    }

    fn audio(&self, exercise: &Exercise) -> Option<String> {
        exercise
            .media
            .as_ref()
            .and_then(|m| m.audio.as_deref())
            .and_then(|r| self.media.resolve(r))
    }
}

/// What a strategy asks of the engine after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Elicitation {
    /// Nothing to judge yet.
    Pending,
    /// A raw answer for the engine to judge.
    Answer(Value),
    /// The strategy already knows the outcome (flashcards, matching).
    SelfJudged(bool),
    /// Capture speech in `language` and report back.
    Listen {
        /// Recognition language.
        language: String,
    },
    /// Call back after `Duration`.
    Defer(Duration),
}

/// The interaction logic of one mounted exercise.
pub trait ExerciseStrategy: Send {
    /// The exercise type this strategy presents.
    fn kind(&self) -> ExerciseKind;

    /// Handles an activated control the strategy subscribed to.
    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation;

    /// Handles a speech transcript requested through `Listen`.
    fn on_transcript(&mut self, _transcript: &str, _mount: &mut dyn MountPoint) -> Elicitation {
        Elicitation::Pending
    }

    /// Handles a failed speech capture.
    fn on_speech_failed(&mut self, _error: &VoxError, _mount: &mut dyn MountPoint) -> Elicitation {
        Elicitation::Pending
    }

    /// Handles a timer requested through `Defer`.
    fn on_timer(&mut self, _mount: &mut dyn MountPoint) -> Elicitation {
        Elicitation::Pending
    }

    /// Releases every subscription and stops audio this strategy started.
    /// Calling it again does nothing.
    fn teardown(&mut self, mount: &mut dyn MountPoint);
}

/// Mounts `exercise` and returns the strategy now in charge of it.
///
/// # Errors
///
/// Returns `VoxError::UnknownExerciseType` for types outside the closed
/// set. Nothing is subscribed in that case.
pub fn render(
    exercise: &Exercise,
    ctx: &RenderContext,
    mount: &mut dyn MountPoint,
    rng: &mut StdRng,
) -> Result<Box<dyn ExerciseStrategy>> {
    let kind = match &exercise.kind {
        ExerciseType::Known(kind) => *kind,
        ExerciseType::Unknown(tag) => return Err(VoxError::unknown_exercise_type(tag)),
    };

    let strategy: Box<dyn ExerciseStrategy> = match kind {
        ExerciseKind::MultipleChoice | ExerciseKind::Listening => {
            Box::new(ChoiceStrategy::mount(exercise, kind, ctx, mount))
        }
        ExerciseKind::TapFill => Box::new(TapFillStrategy::mount(exercise, ctx, mount)),
        ExerciseKind::Pronunciation => Box::new(PronunciationStrategy::mount(exercise, ctx, mount)),
        ExerciseKind::Flashcard => Box::new(FlashcardStrategy::mount(exercise, ctx, mount)),
        ExerciseKind::SentenceOrder => Box::new(SentenceStrategy::mount(exercise, ctx, mount, rng)),
        ExerciseKind::Matching => Box::new(MatchingStrategy::mount(exercise, ctx, mount, rng)),
    };
    Ok(strategy)
}

/// Subscriptions held by one strategy.
#[derive(Debug, Default)]
struct Subscriptions {
    ids: Vec<ListenerId>,
}

impl Subscriptions {
    fn listen(&mut self, mount: &mut dyn MountPoint, control: Control) -> ListenerId {
        let id = mount.listen(control);
        self.ids.push(id);
        id
    }

    fn release(&mut self, mount: &mut dyn MountPoint, id: ListenerId) {
        if let Some(pos) = self.ids.iter().position(|i| *i == id) {
            self.ids.remove(pos);
            mount.unlisten(id);
        }
    }

    fn release_all(&mut self, mount: &mut dyn MountPoint) {
        for id in self.ids.drain(..) {
            mount.unlisten(id);
        }
    }
}

/// Static parts of an exercise view, shared by every strategy.
#[derive(Debug, Clone)]
struct Frame {
    exercise_id: String,
    kind: ExerciseKind,
    prompt: String,
    image: Option<String>,
}

impl Frame {
    fn new(exercise: &Exercise, kind: ExerciseKind, ctx: &RenderContext) -> Self {
        Self {
            exercise_id: exercise.id.clone(),
            kind,
            prompt: exercise.question.clone(),
            image: ctx.image(exercise),
        }
    }

    fn view(&self, body: ViewBody, status: Option<String>) -> View {
        View::Exercise(ExerciseView {
            exercise_id: self.exercise_id.clone(),
            exercise_type: self.kind,
            prompt: self.prompt.clone(),
            image: self.image.clone(),
            body,
            status,
        })
    }
}

/// Renders an answer value as display text.
fn answer_text(answer: &Value) -> String {
    match answer {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}
