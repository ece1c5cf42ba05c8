//! Sentence ordering: build the sentence from a shuffled word bank.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::Value;

use super::{Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind};
use crate::view::{Control, MountPoint, Tile, TileState, View, ViewBody};

/// Word-bank exercise.
///
/// Each bank word can be placed once. The submission has the same shape as
/// the expected answer: an array for array answers, otherwise the words
/// joined with single spaces.
#[derive(Debug)]
pub struct SentenceStrategy {
    frame: Frame,
    bank: Vec<String>,
    assembled: Vec<usize>,
    submit_as_array: bool,
    subs: Subscriptions,
}

impl SentenceStrategy {
    /// Mounts a sentence ordering exercise, shuffling the bank with `rng`.
    pub fn mount(
        exercise: &Exercise,
        ctx: &RenderContext,
        mount: &mut dyn MountPoint,
        rng: &mut StdRng,
    ) -> Self {
        let mut bank = word_bank(exercise);
        bank.shuffle(rng);

        let mut strategy = Self {
            frame: Frame::new(exercise, ExerciseKind::SentenceOrder, ctx),
            bank,
            assembled: Vec::new(),
            submit_as_array: exercise.answer.is_array(),
            subs: Subscriptions::default(),
        };
        for i in 0..strategy.bank.len() {
            strategy.subs.listen(mount, Control::Word(i));
        }
        strategy.subs.listen(mount, Control::Reset);
        strategy.subs.listen(mount, Control::Check);
        mount.present(strategy.view());
        strategy
    }

    fn words(&self) -> Vec<String> {
        self.assembled
            .iter()
            .filter_map(|i| self.bank.get(*i).cloned())
            .collect()
    }

    fn submission(&self) -> Value {
        let words = self.words();
        if self.submit_as_array {
            Value::Array(words.into_iter().map(Value::String).collect())
        } else {
            Value::String(words.join(" "))
        }
    }

    fn view(&self) -> View {
        let bank = self
            .bank
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let state = if self.assembled.contains(&i) {
                    TileState::Used
                } else {
                    TileState::Idle
                };
                Tile::with_state(w.clone(), state)
            })
            .collect();
        self.frame.view(
            ViewBody::SentenceOrder {
                bank,
                assembled: self.words(),
            },
            None,
        )
    }
}

/// The exercise's options, or the words of its answer when it has none.
fn word_bank(exercise: &Exercise) -> Vec<String> {
    if !exercise.options.is_empty() {
        return exercise.options.clone();
    }
    match &exercise.answer {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        Value::String(s) => s.split_whitespace().map(ToString::to_string).collect(),
        _ => Vec::new(),
    }
}

impl ExerciseStrategy for SentenceStrategy {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::SentenceOrder
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        match control {
            Control::Word(i) if i < self.bank.len() && !self.assembled.contains(&i) => {
                self.assembled.push(i);
                mount.present(self.view());
                Elicitation::Pending
            }
            Control::Reset => {
                self.assembled.clear();
                mount.present(self.view());
                Elicitation::Pending
            }
            Control::Check if !self.assembled.is_empty() => Elicitation::Answer(self.submission()),
            _ => Elicitation::Pending,
        }
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
    }
}
