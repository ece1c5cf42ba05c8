//! Pronunciation: say the prompt, judged on the transcript.

use serde_json::Value;
use tracing::debug;

use super::{Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind};
use crate::error::VoxError;
use crate::view::{Control, MountPoint, View, ViewBody};

/// Status shown when a capture produced nothing usable.
pub const RETRY_STATUS: &str = "Could not hear you. Try again.";

/// Speech-driven exercise.
///
/// While a capture is in progress the microphone control is ignored; a
/// failed capture re-enables it without reporting anything.
#[derive(Debug)]
pub struct PronunciationStrategy {
    frame: Frame,
    language: String,
    listening: bool,
    status: Option<String>,
    subs: Subscriptions,
}

impl PronunciationStrategy {
    /// Mounts a pronunciation exercise.
    pub fn mount(exercise: &Exercise, ctx: &RenderContext, mount: &mut dyn MountPoint) -> Self {
        let mut strategy = Self {
            frame: Frame::new(exercise, ExerciseKind::Pronunciation, ctx),
            language: ctx.voice_language(exercise),
            listening: false,
            status: None,
            subs: Subscriptions::default(),
        };
        strategy.subs.listen(mount, Control::Mic);
        mount.present(strategy.view());
        strategy
    }

    /// Recognition language for this exercise.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    fn view(&self) -> View {
        self.frame.view(
            ViewBody::Pronunciation {
                mic_enabled: !self.listening,
                listening: self.listening,
            },
            self.status.clone(),
        )
    }
}

impl ExerciseStrategy for PronunciationStrategy {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Pronunciation
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        if control != Control::Mic || self.listening {
            return Elicitation::Pending;
        }
        self.listening = true;
        self.status = Some("Listening...".to_string());
        mount.present(self.view());
        Elicitation::Listen {
            language: self.language.clone(),
        }
    }

    fn on_transcript(&mut self, transcript: &str, mount: &mut dyn MountPoint) -> Elicitation {
        if !self.listening {
            return Elicitation::Pending;
        }
        self.listening = false;
        self.status = Some(format!("You said: \"{transcript}\""));
        mount.present(self.view());
        Elicitation::Answer(Value::String(transcript.to_string()))
    }

    fn on_speech_failed(&mut self, error: &VoxError, mount: &mut dyn MountPoint) -> Elicitation {
        debug!(error = %error, "Speech capture failed");
        self.listening = false;
        self.status = Some(RETRY_STATUS.to_string());
        mount.present(self.view());
        Elicitation::Pending
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
        self.listening = false;
    }
}
