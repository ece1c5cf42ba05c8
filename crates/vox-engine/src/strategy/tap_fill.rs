//! Tap-fill: pick the word for the blank, then check.

use serde_json::Value;

use super::{Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind};
use crate::view::{Control, MountPoint, Tile, TileState, View, ViewBody};

/// Marks the blank in a tap-fill question.
pub const BLANK: &str = "___";

/// Selecting an option fills the blank; selecting another replaces it.
/// Nothing is judged until `Check`.
#[derive(Debug)]
pub struct TapFillStrategy {
    frame: Frame,
    question: String,
    options: Vec<String>,
    selected: Option<usize>,
    subs: Subscriptions,
}

impl TapFillStrategy {
    /// Mounts a tap-fill exercise.
    pub fn mount(exercise: &Exercise, ctx: &RenderContext, mount: &mut dyn MountPoint) -> Self {
        let mut strategy = Self {
            frame: Frame::new(exercise, ExerciseKind::TapFill, ctx),
            question: exercise.question.clone(),
            options: exercise.options.clone(),
            selected: None,
            subs: Subscriptions::default(),
        };
        for i in 0..strategy.options.len() {
            strategy.subs.listen(mount, Control::Option(i));
        }
        strategy.subs.listen(mount, Control::Check);
        mount.present(strategy.view());
        strategy
    }

    fn sentence(&self) -> String {
        let Some(word) = self.selected.and_then(|i| self.options.get(i)) else {
            return self.question.clone();
        };
        if self.question.contains(BLANK) {
            self.question.replacen(BLANK, word, 1)
        } else {
            format!("{} {word}", self.question.trim_end())
        }
    }

    fn view(&self) -> View {
        let options = self
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let state = if self.selected == Some(i) {
                    TileState::Selected
                } else {
                    TileState::Idle
                };
                Tile::with_state(o.clone(), state)
            })
            .collect();
        self.frame.view(
            ViewBody::TapFill {
                sentence: self.sentence(),
                options,
            },
            None,
        )
    }
}

impl ExerciseStrategy for TapFillStrategy {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::TapFill
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        match control {
            Control::Option(i) if i < self.options.len() => {
                self.selected = Some(i);
                mount.present(self.view());
                Elicitation::Pending
            }
            Control::Check => self
                .selected
                .and_then(|i| self.options.get(i))
                .map_or(Elicitation::Pending, |word| {
                    Elicitation::Answer(Value::String(word.clone()))
                }),
            _ => Elicitation::Pending,
        }
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
    }
}
