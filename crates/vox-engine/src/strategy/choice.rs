//! Multiple choice and listening.

use serde_json::Value;

use super::{Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind};
use crate::view::{Control, MountPoint, View, ViewBody};

/// Pick one option. Listening exercises play their audio first and offer
/// a replay control.
#[derive(Debug)]
pub struct ChoiceStrategy {
    frame: Frame,
    options: Vec<String>,
    audio: Option<String>,
    playing: bool,
    subs: Subscriptions,
}

impl ChoiceStrategy {
    /// Mounts a choice exercise of `kind` (multiple choice or listening).
    pub fn mount(
        exercise: &Exercise,
        kind: ExerciseKind,
        ctx: &RenderContext,
        mount: &mut dyn MountPoint,
    ) -> Self {
        let audio = if kind == ExerciseKind::Listening {
            ctx.audio(exercise)
        } else {
            None
        };

        let mut strategy = Self {
            frame: Frame::new(exercise, kind, ctx),
            options: exercise.options.clone(),
            audio,
            playing: false,
            subs: Subscriptions::default(),
        };

        for i in 0..strategy.options.len() {
            strategy.subs.listen(mount, Control::Option(i));
        }
        if let Some(url) = strategy.audio.clone() {
            strategy.subs.listen(mount, Control::Replay);
            mount.play_audio(&url);
            strategy.playing = true;
        }
        mount.present(strategy.view());
        strategy
    }

    fn view(&self) -> View {
        let status = (self.frame.kind == ExerciseKind::Listening && self.audio.is_none())
            .then(|| "Audio unavailable".to_string());
        self.frame.view(
            ViewBody::Choices {
                options: self.options.clone(),
                audio: self.audio.clone(),
            },
            status,
        )
    }
}

impl ExerciseStrategy for ChoiceStrategy {
    fn kind(&self) -> ExerciseKind {
        self.frame.kind
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        match control {
            Control::Option(i) => self
                .options
                .get(i)
                .map_or(Elicitation::Pending, |o| Elicitation::Answer(Value::String(o.clone()))),
            Control::Replay => {
                if let Some(url) = &self.audio {
                    mount.play_audio(url);
                    self.playing = true;
                }
                Elicitation::Pending
            }
            _ => Elicitation::Pending,
        }
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
        if self.playing {
            mount.stop_audio();
            self.playing = false;
        }
    }
}
