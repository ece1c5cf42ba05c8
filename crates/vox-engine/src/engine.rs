//! The exercise engine: runs one exercise at a time on a mount point.
//!
//! The engine owns the only active strategy. Mounting a new exercise
//! always tears the previous one down first, so no listener or audio of an
//! old exercise can outlive it. Asynchronous work requested by a strategy
//! (speech capture, timers) is handed out as tickets stamped with the mount
//! generation; results carrying an outdated ticket are dropped.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::answer::check_answer;
use crate::content::Exercise;
use crate::error::Result;
use crate::strategy::{self, Elicitation, ExerciseStrategy, RenderContext};
use crate::view::{Control, MountPoint};

/// The outcome of judging one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    /// The judged exercise.
    pub exercise_id: String,
    /// Whether the submission was correct.
    pub correct: bool,
}

/// A pending speech capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechTicket {
    /// Mount generation the capture belongs to.
    pub generation: u64,
    /// Recognition language.
    pub language: String,
}

/// A pending strategy timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    /// Mount generation the timer belongs to.
    pub generation: u64,
    /// How long to wait before firing.
    pub delay: Duration,
}

/// What happened in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStep {
    /// Nothing is mounted, nobody listens to the control, or the ticket
    /// is stale.
    Ignored,
    /// The strategy took note; nothing to judge yet.
    Pending,
    /// A submission was judged.
    Verdict(Verdict),
    /// Speech must be captured, then passed to
    /// [`ExerciseEngine::resolve_speech`].
    Listen(SpeechTicket),
    /// [`ExerciseEngine::fire`] must be called after the delay.
    Deferred(TimerTicket),
}

struct ActiveExercise {
    exercise: Exercise,
    strategy: Box<dyn ExerciseStrategy>,
}

/// Runs exercises on a mount point.
pub struct ExerciseEngine<M: MountPoint> {
    mount: M,
    rng: StdRng,
    active: Option<ActiveExercise>,
    generation: u64,
}

impl<M: MountPoint> std::fmt::Debug for ExerciseEngine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseEngine")
            .field("active", &self.active.as_ref().map(|a| &a.exercise.id))
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<M: MountPoint> ExerciseEngine<M> {
    /// Creates an engine with a randomly seeded shuffle.
    pub fn new(mount: M) -> Self {
        Self::with_seed(mount, rand::random())
    }

    /// Creates an engine whose shuffles are reproducible.
    pub fn with_seed(mount: M, seed: u64) -> Self {
        Self {
            mount,
            rng: StdRng::seed_from_u64(seed),
            active: None,
            generation: 0,
        }
    }

    /// The mount point.
    pub const fn mount(&self) -> &M {
        &self.mount
    }

    /// Mutable access to the mount point.
    pub fn mount_mut(&mut self) -> &mut M {
        &mut self.mount
    }

    /// Current mount generation.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The exercise currently mounted, if any.
    pub fn active_exercise(&self) -> Option<&Exercise> {
        self.active.as_ref().map(|a| &a.exercise)
    }

    /// Mounts `exercise`, replacing whatever was mounted.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::UnknownExerciseType` if the exercise cannot be
    /// presented. The error is also shown inline and nothing stays mounted.
    pub fn run(&mut self, exercise: &Exercise, ctx: &RenderContext) -> Result<()> {
        self.teardown_active();
        self.mount.clear();
        self.generation += 1;

        match strategy::render(exercise, ctx, &mut self.mount, &mut self.rng) {
            Ok(strategy) => {
                debug!(
                    exercise = %exercise.id,
                    kind = exercise.kind.tag(),
                    generation = self.generation,
                    "Exercise mounted"
                );
                self.active = Some(ActiveExercise {
                    exercise: exercise.clone(),
                    strategy,
                });
                Ok(())
            }
            Err(e) => {
                warn!(exercise = %exercise.id, error = %e, "Exercise cannot be presented");
                self.mount.report_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Delivers a user action to the active strategy.
    pub fn dispatch(&mut self, control: Control) -> EngineStep {
        if !self.mount.is_listening(control) {
            return EngineStep::Ignored;
        }
        let Some(active) = self.active.as_mut() else {
            return EngineStep::Ignored;
        };
        let elicitation = active.strategy.on_action(control, &mut self.mount);
        step(elicitation, &active.exercise, self.generation)
    }

    /// Delivers the result of a speech capture.
    pub fn resolve_speech(&mut self, ticket: &SpeechTicket, result: Result<String>) -> EngineStep {
        if ticket.generation != self.generation {
            debug!(ticket = ticket.generation, current = self.generation, "Dropping stale speech result");
            return EngineStep::Ignored;
        }
        let Some(active) = self.active.as_mut() else {
            return EngineStep::Ignored;
        };
        let elicitation = match result {
            Ok(transcript) => active.strategy.on_transcript(&transcript, &mut self.mount),
            Err(e) => active.strategy.on_speech_failed(&e, &mut self.mount),
        };
        step(elicitation, &active.exercise, self.generation)
    }

    /// Fires a strategy timer.
    pub fn fire(&mut self, ticket: &TimerTicket) -> EngineStep {
        if ticket.generation != self.generation {
            debug!(ticket = ticket.generation, current = self.generation, "Dropping stale timer");
            return EngineStep::Ignored;
        }
        let Some(active) = self.active.as_mut() else {
            return EngineStep::Ignored;
        };
        let elicitation = active.strategy.on_timer(&mut self.mount);
        step(elicitation, &active.exercise, self.generation)
    }

    /// Tears down the active exercise and clears the surface.
    pub fn clear(&mut self) {
        self.teardown_active();
        self.mount.clear();
        self.generation += 1;
    }

    /// Presents a view outside any exercise (e.g. the completion screen).
    pub fn present(&mut self, view: crate::view::View) {
        self.mount.present(view);
    }

    fn teardown_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.strategy.teardown(&mut self.mount);
            debug!(exercise = %active.exercise.id, "Exercise torn down");
        }
    }
}

fn step(elicitation: Elicitation, exercise: &Exercise, generation: u64) -> EngineStep {
    match elicitation {
        Elicitation::Pending => EngineStep::Pending,
        Elicitation::Answer(raw) => EngineStep::Verdict(Verdict {
            exercise_id: exercise.id.clone(),
            correct: check_answer(&raw, &exercise.answer),
        }),
        Elicitation::SelfJudged(correct) => EngineStep::Verdict(Verdict {
            exercise_id: exercise.id.clone(),
            correct,
        }),
        Elicitation::Listen { language } => EngineStep::Listen(SpeechTicket {
            generation,
            language,
        }),
        Elicitation::Defer(delay) => EngineStep::Deferred(TimerTicket { generation, delay }),
    }
}
