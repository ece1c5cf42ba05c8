//! Flashcards: flip, then confirm.

use super::{answer_text, Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind};
use crate::view::{Control, MountPoint, View, ViewBody};

/// Self-judged card. Confirming always counts as correct.
#[derive(Debug)]
pub struct FlashcardStrategy {
    frame: Frame,
    back: String,
    flipped: bool,
    subs: Subscriptions,
}

impl FlashcardStrategy {
    /// Mounts a flashcard.
    pub fn mount(exercise: &Exercise, ctx: &RenderContext, mount: &mut dyn MountPoint) -> Self {
        let mut strategy = Self {
            frame: Frame::new(exercise, ExerciseKind::Flashcard, ctx),
            back: answer_text(&exercise.answer),
            flipped: false,
            subs: Subscriptions::default(),
        };
        strategy.subs.listen(mount, Control::Flip);
        strategy.subs.listen(mount, Control::Confirm);
        mount.present(strategy.view());
        strategy
    }

    fn view(&self) -> View {
        self.frame.view(
            ViewBody::Flashcard {
                front: self.frame.prompt.clone(),
                back: self.back.clone(),
                flipped: self.flipped,
            },
            None,
        )
    }
}

impl ExerciseStrategy for FlashcardStrategy {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Flashcard
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        match control {
            Control::Flip => {
                self.flipped = !self.flipped;
                mount.present(self.view());
                Elicitation::Pending
            }
            Control::Confirm => Elicitation::SelfJudged(true),
            _ => Elicitation::Pending,
        }
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
    }
}
