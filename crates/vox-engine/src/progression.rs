//! Stage progression: `Idle → Loading → Running(i) → Complete`.
//!
//! The controller walks a stage's exercises in order, turns verdicts into
//! feedback and advances, and persists progress after every change. It is
//! synchronous. Fetches and delays happen outside, and their results come
//! back with the ticket that requested them; a ticket from an earlier
//! selection or advance is recognized and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::access::{can_enter, is_stage_accessible, unlock_language, unlock_stage};
use crate::config::Timings;
use crate::content::{Stage, StageLocation, StageRef};
use crate::engine::{EngineStep, ExerciseEngine, SpeechTicket, TimerTicket};
use crate::error::{Result, VoxError};
use crate::events::{EventBroadcaster, PlayerEvent};
use crate::progress::{ProgressStore, UserProgress};
use crate::strategy::RenderContext;
use crate::view::{Control, MountPoint, View};

/// Where the controller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProgressionState {
    /// No stage selected (menu).
    Idle,
    /// Waiting for a stage to arrive.
    Loading,
    /// Presenting exercise `index`.
    Running {
        /// Index of the mounted exercise.
        index: usize,
        /// A correct answer was given and the advance is pending.
        advancing: bool,
    },
    /// Every exercise of the stage was answered correctly.
    Complete,
}

impl std::fmt::Display for ProgressionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Running { index, .. } => write!(f, "running({index})"),
            Self::Complete => f.write_str("complete"),
        }
    }
}

/// A stage fetch in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectTicket {
    generation: u64,
    location: StageLocation,
    identifier: String,
    resume: bool,
}

impl SelectTicket {
    /// The content identifier to fetch.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The stage being selected.
    #[must_use]
    pub const fn location(&self) -> &StageLocation {
        &self.location
    }
}

/// A pending move to the next exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceTicket {
    generation: u64,
    index: usize,
    /// How long to wait before advancing.
    pub delay: Duration,
}

/// A feedback overlay to clear later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackTicket {
    /// Overlay identifier, as sent in the `feedback` event.
    pub id: u64,
    /// How long the overlay stays up.
    pub delay: Duration,
}

/// What a learner action led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Not applicable right now.
    Ignored,
    /// Taken into account; nothing judged yet.
    Pending,
    /// Wrong answer; the same exercise stays up.
    Retry(FeedbackTicket),
    /// Right answer; advance after the ticket's delay.
    Advance {
        /// Overlay to clear.
        feedback: FeedbackTicket,
        /// Pending advance.
        advance: AdvanceTicket,
    },
    /// Speech must be captured.
    Listen(SpeechTicket),
    /// A strategy timer must be fired later.
    Deferred(TimerTicket),
}

impl ActionOutcome {
    /// Short name for API responses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Pending => "pending",
            Self::Retry(_) => "retry",
            Self::Advance { .. } => "advance",
            Self::Listen(_) => "listen",
            Self::Deferred(_) => "deferred",
        }
    }

    /// The verdict carried by this outcome, if any.
    #[must_use]
    pub const fn correct(&self) -> Option<bool> {
        match self {
            Self::Retry(_) => Some(false),
            Self::Advance { .. } => Some(true),
            _ => None,
        }
    }
}

/// Result of finishing a stage selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The stage is running from `index`.
    Started {
        /// First mounted exercise.
        index: usize,
        /// Number of exercises in the stage.
        total: usize,
    },
    /// The ticket was superseded; nothing changed.
    Stale,
}

/// Result of an advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The next exercise is mounted.
    Next {
        /// Its index.
        index: usize,
    },
    /// The stage is complete.
    Complete {
        /// Stage numbers now unlocked in this section.
        unlocked: Vec<u32>,
    },
    /// The ticket was superseded or already used.
    Stale,
}

#[derive(Debug)]
struct LoadedStage {
    location: StageLocation,
    stage: Stage,
}

/// Drives a learner through stages.
pub struct ProgressionController<M: MountPoint> {
    engine: ExerciseEngine<M>,
    store: Arc<dyn ProgressStore>,
    events: EventBroadcaster,
    progress: UserProgress,
    render: RenderContext,
    timings: Timings,
    state: ProgressionState,
    location: Option<StageLocation>,
    stage: Option<LoadedStage>,
    generation: u64,
    feedback_seq: u64,
}

impl<M: MountPoint> std::fmt::Debug for ProgressionController<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionController")
            .field("state", &self.state)
            .field("location", &self.location)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<M: MountPoint> ProgressionController<M> {
    /// Creates a controller in `Idle`, loading progress from `store`.
    pub fn new(
        engine: ExerciseEngine<M>,
        store: Arc<dyn ProgressStore>,
        events: EventBroadcaster,
        render: RenderContext,
        timings: Timings,
    ) -> Self {
        let progress = store.load();
        Self {
            engine,
            store,
            events,
            progress,
            render,
            timings,
            state: ProgressionState::Idle,
            location: None,
            stage: None,
            generation: 0,
            feedback_seq: 0,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ProgressionState {
        self.state
    }

    /// The learner's progress.
    pub const fn progress(&self) -> &UserProgress {
        &self.progress
    }

    /// The exercise engine.
    pub const fn engine(&self) -> &ExerciseEngine<M> {
        &self.engine
    }

    /// The selected stage, while loading, running, or complete.
    pub const fn location(&self) -> Option<&StageLocation> {
        self.location.as_ref()
    }

    /// Number of exercises in the loaded stage.
    pub fn total(&self) -> Option<usize> {
        self.stage.as_ref().map(|s| s.stage.exercises.len())
    }

    /// Starts selecting a stage. The caller fetches
    /// [`SelectTicket::identifier`] and hands the result to
    /// [`Self::finish_select`].
    ///
    /// # Errors
    ///
    /// Returns `VoxError::StageLocked` if the learner may not enter the
    /// stage. The current state is left untouched.
    pub fn begin_select(&mut self, location: StageLocation, stage_ref: &StageRef) -> Result<SelectTicket> {
        self.begin(location, stage_ref, false)
    }

    /// Like [`Self::begin_select`], but picks up at the saved exercise
    /// index when the resume cursor points at this stage.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::StageLocked` if the learner may not enter the
    /// stage.
    pub fn begin_resume(&mut self, location: StageLocation, stage_ref: &StageRef) -> Result<SelectTicket> {
        self.begin(location, stage_ref, true)
    }

    fn begin(&mut self, location: StageLocation, stage_ref: &StageRef, resume: bool) -> Result<SelectTicket> {
        if !can_enter(&self.progress, &location, stage_ref) {
            warn!(stage = %location, "Stage is locked");
            return Err(location.locked());
        }

        self.engine.clear();
        self.generation += 1;
        self.state = ProgressionState::Loading;
        self.stage = None;
        self.location = Some(location.clone());
        debug!(stage = %location, cid = %stage_ref.cid, "Loading stage");

        Ok(SelectTicket {
            generation: self.generation,
            location,
            identifier: stage_ref.cid.clone(),
            resume,
        })
    }

    /// Completes a stage selection with the fetched document.
    ///
    /// # Errors
    ///
    /// On a failed fetch, unparsable content, or an empty stage, returns
    /// `VoxError::ContentLoadFailure` and goes back to `Idle`. Returns
    /// `VoxError::StageLocked` if the stage document itself locks the
    /// language.
    pub fn finish_select(&mut self, ticket: &SelectTicket, fetched: Result<Value>) -> Result<SelectOutcome> {
        if ticket.generation != self.generation || self.state != ProgressionState::Loading {
            debug!(stage = %ticket.location, "Dropping stale stage load");
            return Ok(SelectOutcome::Stale);
        }

        let stage = match fetched.and_then(|value| Stage::from_value(&ticket.identifier, value)) {
            Ok(stage) if stage.exercises.is_empty() => {
                return Err(self.fail_select(VoxError::content_load(&ticket.identifier, "stage has no exercises")));
            }
            Ok(stage) => stage,
            Err(e @ VoxError::ContentLoadFailure { .. }) => return Err(self.fail_select(e)),
            Err(e) => return Err(self.fail_select(VoxError::content_load(&ticket.identifier, e))),
        };

        let location = &ticket.location;
        if let Some(lock) = stage.lock_config() {
            let open = is_stage_accessible(location.stage, &location.language, Some(&lock))
                || self.progress.unlocked_languages.contains(&location.language)
                || self.progress.is_stage_unlocked(location);
            if !open {
                return Err(self.fail_select(location.locked()));
            }
        }

        let total = stage.exercises.len();
        let index = match self.progress.cursor() {
            Some(cursor) if ticket.resume && cursor == *location && self.progress.exercise_index < total => {
                self.progress.exercise_index
            }
            _ => 0,
        };

        info!(stage = %location, exercises = total, start = index, "Stage loaded");
        self.render.target_language = Some(location.language.clone());
        self.stage = Some(LoadedStage {
            location: location.clone(),
            stage,
        });
        self.enter_exercise(index);
        Ok(SelectOutcome::Started { index, total })
    }

    fn fail_select(&mut self, err: VoxError) -> VoxError {
        warn!(error = %err, "Stage selection failed");
        self.state = ProgressionState::Idle;
        self.location = None;
        self.stage = None;
        self.events.send(PlayerEvent::from_error(&err));
        err
    }

    fn enter_exercise(&mut self, index: usize) {
        self.state = ProgressionState::Running {
            index,
            advancing: false,
        };
        let Some(loaded) = &self.stage else {
            return;
        };
        self.progress.set_cursor(&loaded.location, index);
        let exercise = loaded.stage.exercises.get(index).cloned();
        self.persist();

        if let Some(exercise) = exercise {
            if let Err(e) = self.engine.run(&exercise, &self.render) {
                self.events.send(PlayerEvent::from_error(&e));
            }
        }
    }

    /// Delivers a learner action.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::NoActiveStage` in `Idle` and
    /// `VoxError::InvalidStateTransition` while a stage is loading or
    /// after it is complete.
    pub fn handle_action(&mut self, control: Control) -> Result<ActionOutcome> {
        match self.state {
            ProgressionState::Running { advancing: false, .. } => {
                let step = self.engine.dispatch(control);
                Ok(self.on_step(step))
            }
            ProgressionState::Running { advancing: true, .. } => Ok(ActionOutcome::Ignored),
            ProgressionState::Idle => Err(VoxError::NoActiveStage),
            state => Err(VoxError::invalid_transition(state, "answering")),
        }
    }

    /// Delivers the result of a speech capture.
    pub fn resolve_speech(&mut self, ticket: &SpeechTicket, result: Result<String>) -> ActionOutcome {
        if !matches!(self.state, ProgressionState::Running { advancing: false, .. }) {
            return ActionOutcome::Ignored;
        }
        let step = self.engine.resolve_speech(ticket, result);
        self.on_step(step)
    }

    /// Fires a strategy timer.
    pub fn fire(&mut self, ticket: &TimerTicket) -> ActionOutcome {
        if !matches!(self.state, ProgressionState::Running { .. }) {
            return ActionOutcome::Ignored;
        }
        let step = self.engine.fire(ticket);
        self.on_step(step)
    }

    fn on_step(&mut self, step: EngineStep) -> ActionOutcome {
        match step {
            EngineStep::Ignored => ActionOutcome::Ignored,
            EngineStep::Pending => ActionOutcome::Pending,
            EngineStep::Listen(ticket) => ActionOutcome::Listen(ticket),
            EngineStep::Deferred(ticket) => ActionOutcome::Deferred(ticket),
            EngineStep::Verdict(verdict) => {
                self.feedback_seq += 1;
                let feedback = FeedbackTicket {
                    id: self.feedback_seq,
                    delay: self.timings.feedback(),
                };
                self.events.send(PlayerEvent::feedback(
                    feedback.id,
                    &verdict.exercise_id,
                    verdict.correct,
                    feedback.delay,
                ));

                let ProgressionState::Running { index, .. } = self.state else {
                    return ActionOutcome::Ignored;
                };
                if !verdict.correct {
                    debug!(exercise = %verdict.exercise_id, index, "Wrong answer, retry");
                    return ActionOutcome::Retry(feedback);
                }

                debug!(exercise = %verdict.exercise_id, index, "Correct answer");
                self.state = ProgressionState::Running {
                    index,
                    advancing: true,
                };
                ActionOutcome::Advance {
                    feedback,
                    advance: AdvanceTicket {
                        generation: self.generation,
                        index,
                        delay: self.timings.advance_delay(),
                    },
                }
            }
        }
    }

    /// Moves past a correctly answered exercise.
    pub fn advance(&mut self, ticket: &AdvanceTicket) -> AdvanceOutcome {
        let expected = ProgressionState::Running {
            index: ticket.index,
            advancing: true,
        };
        if ticket.generation != self.generation || self.state != expected {
            debug!(index = ticket.index, "Dropping stale advance");
            return AdvanceOutcome::Stale;
        }
        let Some(total) = self.total() else {
            return AdvanceOutcome::Stale;
        };

        let next = ticket.index + 1;
        if next < total {
            self.enter_exercise(next);
            return AdvanceOutcome::Next { index: next };
        }
        self.complete()
    }

    fn complete(&mut self) -> AdvanceOutcome {
        let Some(location) = self.stage.as_ref().map(|s| s.location.clone()) else {
            return AdvanceOutcome::Stale;
        };

        let unlocked: Vec<u32> = std::iter::once(location.stage)
            .chain(location.stage.checked_add(1))
            .collect();
        for number in &unlocked {
            let mut target = location.clone();
            target.stage = *number;
            unlock_stage(&mut self.progress, &target);
        }
        self.progress.exercise_index = 0;
        self.progress.touch();
        self.persist();

        self.state = ProgressionState::Complete;
        self.engine.clear();
        self.engine.present(View::StageComplete {
            location: location.clone(),
            unlocked: unlocked.clone(),
        });
        self.events
            .send(PlayerEvent::stage_complete(location.clone(), unlocked.clone()));
        info!(stage = %location, "Stage complete");

        AdvanceOutcome::Complete { unlocked }
    }

    /// Leaves whatever is going on and returns to the menu.
    pub fn return_to_menu(&mut self) {
        let was_complete = self.state == ProgressionState::Complete;
        self.engine.clear();
        self.generation += 1;
        self.state = ProgressionState::Idle;
        self.stage = None;
        self.location = None;

        if was_complete && self.progress.exercise_index != 0 {
            self.progress.exercise_index = 0;
            self.progress.touch();
            self.persist();
        }
    }

    /// Sets the target and/or translation language.
    pub fn set_languages(&mut self, target: Option<String>, translation: Option<String>) {
        if target.is_none() && translation.is_none() {
            return;
        }
        if let Some(target) = target {
            self.progress.target_language = Some(target);
        }
        if let Some(translation) = translation {
            self.progress.translation_language = Some(translation);
        }
        self.progress.touch();
        self.persist();
    }

    /// Unlocks every stage of `language`. Returns `true` if anything
    /// changed.
    pub fn unlock_language(&mut self, language: &str) -> bool {
        let changed = unlock_language(&mut self.progress, language);
        if changed {
            info!(language, "Language unlocked");
            self.persist();
        }
        changed
    }

    /// Forgets all progress and returns to the menu.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    pub fn reset_progress(&mut self) -> Result<()> {
        self.return_to_menu();
        self.store.reset()?;
        self.progress = UserProgress::default();
        info!("Progress reset");
        Ok(())
    }

    fn persist(&self) {
        match self.store.save(&self.progress) {
            Ok(()) => {
                self.events
                    .send(PlayerEvent::progress_saved(self.progress.updated_at));
            }
            Err(e) => warn!(error = %e, "Failed to persist progress"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::sync::broadcast::Receiver;
    use vox_content::MediaResolver;

    use super::*;
    use crate::progress::MemoryStore;
    use crate::view::RecordingMount;

    fn stage_json() -> Value {
        json!({
            "id": 1,
            "exercises": [
                { "id": "a", "type": "multiple_choice", "question": "Dog?", "options": ["gato", "perro"], "answer": "perro" },
                { "id": "b", "type": "flashcard", "question": "hola", "answer": "hello" },
                { "id": "c", "type": "tap_fill", "question": "Yo ___", "options": ["soy", "eres"], "answer": "soy" }
            ]
        })
    }

    fn stage_ref(number: u32, is_free: Option<bool>) -> StageRef {
        StageRef {
            number,
            cid: format!("stage-{number}"),
            is_free,
            locked_languages: None,
        }
    }

    fn location(stage: u32) -> StageLocation {
        StageLocation::new("es", "A1", "Basics", stage)
    }

    fn controller(store: Arc<MemoryStore>) -> (ProgressionController<RecordingMount>, Receiver<PlayerEvent>) {
        let events = EventBroadcaster::new(256);
        let rx = events.subscribe();
        let render = RenderContext::new(MediaResolver::new("https://cdn.example/", &[]));
        let controller = ProgressionController::new(
            ExerciseEngine::with_seed(RecordingMount::new(), 1),
            store,
            events,
            render,
            Timings::default(),
        );
        (controller, rx)
    }

    fn started(store: Arc<MemoryStore>) -> (ProgressionController<RecordingMount>, Receiver<PlayerEvent>) {
        let (mut c, rx) = controller(store);
        let ticket = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        c.finish_select(&ticket, Ok(stage_json())).unwrap();
        (c, rx)
    }

    fn drain(rx: &mut Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Answers the mounted exercise correctly.
    fn answer_correctly(c: &mut ProgressionController<RecordingMount>) -> AdvanceTicket {
        let id = c.engine().active_exercise().unwrap().id.clone();
        let outcome = match id.as_str() {
            "a" => c.handle_action(Control::Option(1)).unwrap(),
            "b" => c.handle_action(Control::Confirm).unwrap(),
            "c" => {
                c.handle_action(Control::Option(0)).unwrap();
                c.handle_action(Control::Check).unwrap()
            }
            other => unreachable!("unexpected exercise {other}"),
        };
        match outcome {
            ActionOutcome::Advance { advance, .. } => advance,
            other => unreachable!("expected advance, got {other:?}"),
        }
    }

    #[test]
    fn test_select_runs_first_exercise() {
        let store = Arc::new(MemoryStore::new());
        let (c, _rx) = started(Arc::clone(&store));

        assert_eq!(c.state(), ProgressionState::Running { index: 0, advancing: false });
        assert_eq!(c.engine().active_exercise().unwrap().id, "a");
        assert_eq!(c.total(), Some(3));
        assert_eq!(store.stored().unwrap().cursor(), Some(location(1)));
    }

    #[test]
    fn test_locked_stage_keeps_state() {
        let (mut c, _rx) = controller(Arc::new(MemoryStore::new()));
        let err = c.begin_select(location(2), &stage_ref(2, Some(false))).unwrap_err();
        assert!(matches!(err, VoxError::StageLocked { stage: 2, .. }));
        assert_eq!(c.state(), ProgressionState::Idle);
    }

    #[test]
    fn test_wrong_answer_stays_for_retry() {
        let (mut c, mut rx) = started(Arc::new(MemoryStore::new()));
        drain(&mut rx);

        let outcome = c.handle_action(Control::Option(0)).unwrap();
        assert!(matches!(outcome, ActionOutcome::Retry(_)));
        assert_eq!(outcome.correct(), Some(false));
        assert_eq!(c.state(), ProgressionState::Running { index: 0, advancing: false });
        assert_eq!(c.engine().active_exercise().unwrap().id, "a");

        let events = drain(&mut rx);
        assert!(matches!(&events[..], [PlayerEvent::Feedback(f)] if !f.correct));

        assert!(matches!(c.handle_action(Control::Option(1)).unwrap(), ActionOutcome::Advance { .. }));
    }

    #[test]
    fn test_actions_ignored_while_advancing() {
        let (mut c, _rx) = started(Arc::new(MemoryStore::new()));
        let _ticket = answer_correctly(&mut c);
        assert_eq!(c.handle_action(Control::Option(1)).unwrap(), ActionOutcome::Ignored);
    }

    #[test]
    fn test_full_stage_completes_once_and_persists_once() {
        let store = Arc::new(MemoryStore::new());
        let (mut c, mut rx) = started(Arc::clone(&store));

        for expected_next in 1..3 {
            let ticket = answer_correctly(&mut c);
            assert_eq!(c.advance(&ticket), AdvanceOutcome::Next { index: expected_next });
        }

        let ticket = answer_correctly(&mut c);
        drain(&mut rx);
        let saves_before = store.saves();
        assert_eq!(c.advance(&ticket), AdvanceOutcome::Complete { unlocked: vec![1, 2] });
        assert_eq!(store.saves(), saves_before + 1);
        assert_eq!(c.state(), ProgressionState::Complete);

        let completions = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, PlayerEvent::StageComplete(_)))
            .count();
        assert_eq!(completions, 1);

        assert_eq!(c.advance(&ticket), AdvanceOutcome::Stale);
        assert_eq!(store.saves(), saves_before + 1);

        let stored = store.stored().unwrap();
        assert!(stored.is_stage_unlocked(&location(2)));
        assert_eq!(stored.exercise_index, 0);
        assert!(matches!(c.engine().mount().view(), Some(View::StageComplete { .. })));
    }

    #[test]
    fn test_completion_unlocks_next_stage_for_entry() {
        let (mut c, _rx) = started(Arc::new(MemoryStore::new()));
        for _ in 0..3 {
            let ticket = answer_correctly(&mut c);
            c.advance(&ticket);
        }
        c.return_to_menu();
        assert!(c.begin_select(location(2), &stage_ref(2, Some(false))).is_ok());
    }

    #[test]
    fn test_completing_last_numbered_stage() {
        let store = Arc::new(MemoryStore::new());
        let (mut c, _rx) = controller(Arc::clone(&store));
        let last = StageLocation::new("es", "A1", "Basics", u32::MAX);
        let ticket = c.begin_select(last.clone(), &stage_ref(u32::MAX, Some(true))).unwrap();
        let doc = json!({ "exercises": [{ "id": "b", "type": "flashcard", "question": "hola", "answer": "hello" }] });
        c.finish_select(&ticket, Ok(doc)).unwrap();

        let ticket = answer_correctly(&mut c);
        assert_eq!(c.advance(&ticket), AdvanceOutcome::Complete { unlocked: vec![u32::MAX] });
        assert_eq!(c.state(), ProgressionState::Complete);
        assert!(store.stored().unwrap().is_stage_unlocked(&last));
    }

    #[test]
    fn test_duplicate_advance_ignored() {
        let (mut c, _rx) = started(Arc::new(MemoryStore::new()));
        let ticket = answer_correctly(&mut c);
        assert_eq!(c.advance(&ticket), AdvanceOutcome::Next { index: 1 });
        assert_eq!(c.advance(&ticket), AdvanceOutcome::Stale);
        assert_eq!(c.state(), ProgressionState::Running { index: 1, advancing: false });
    }

    #[test]
    fn test_advance_after_return_to_menu_is_stale() {
        let (mut c, _rx) = started(Arc::new(MemoryStore::new()));
        let ticket = answer_correctly(&mut c);
        c.return_to_menu();
        assert_eq!(c.advance(&ticket), AdvanceOutcome::Stale);
        assert_eq!(c.state(), ProgressionState::Idle);
        assert!(c.engine().active_exercise().is_none());
    }

    #[test]
    fn test_fetch_failure_returns_to_idle_with_retryable_error() {
        let (mut c, mut rx) = controller(Arc::new(MemoryStore::new()));
        let ticket = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        assert_eq!(c.state(), ProgressionState::Loading);

        let err = c
            .finish_select(&ticket, Err(VoxError::content_load("stage-1", "offline")))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.state(), ProgressionState::Idle);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Error(p) if p.retryable)));
    }

    #[test]
    fn test_malformed_stage_is_a_load_failure() {
        let (mut c, _rx) = controller(Arc::new(MemoryStore::new()));
        let ticket = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        let err = c.finish_select(&ticket, Ok(json!({ "nope": true }))).unwrap_err();
        assert!(matches!(err, VoxError::ContentLoadFailure { .. }));

        let ticket = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        let err = c.finish_select(&ticket, Ok(json!({ "exercises": [] }))).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.state(), ProgressionState::Idle);
    }

    #[test]
    fn test_stale_select_is_discarded() {
        let (mut c, _rx) = controller(Arc::new(MemoryStore::new()));
        let first = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        let second = c.begin_select(location(1), &stage_ref(1, None)).unwrap();

        assert_eq!(c.finish_select(&first, Ok(stage_json())).unwrap(), SelectOutcome::Stale);
        assert_eq!(c.state(), ProgressionState::Loading);
        assert_eq!(
            c.finish_select(&second, Ok(stage_json())).unwrap(),
            SelectOutcome::Started { index: 0, total: 3 }
        );
    }

    #[test]
    fn test_stage_document_can_lock_language() {
        let (mut c, _rx) = controller(Arc::new(MemoryStore::new()));
        let ticket = c.begin_select(location(2), &stage_ref(2, Some(true))).unwrap();
        let mut doc = stage_json();
        doc["lockedLanguages"] = json!(["es"]);

        let err = c.finish_select(&ticket, Ok(doc)).unwrap_err();
        assert!(matches!(err, VoxError::StageLocked { .. }));
        assert_eq!(c.state(), ProgressionState::Idle);
    }

    #[test]
    fn test_resume_starts_at_saved_index() {
        let mut progress = UserProgress::default();
        progress.set_cursor(&location(1), 2);
        let store = Arc::new(MemoryStore::with_progress(progress));
        let (mut c, _rx) = controller(store);

        let ticket = c.begin_resume(location(1), &stage_ref(1, None)).unwrap();
        assert_eq!(
            c.finish_select(&ticket, Ok(stage_json())).unwrap(),
            SelectOutcome::Started { index: 2, total: 3 }
        );
        assert_eq!(c.engine().active_exercise().unwrap().id, "c");
    }

    #[test]
    fn test_resume_out_of_range_starts_over() {
        let mut progress = UserProgress::default();
        progress.set_cursor(&location(1), 9);
        let (mut c, _rx) = controller(Arc::new(MemoryStore::with_progress(progress)));

        let ticket = c.begin_resume(location(1), &stage_ref(1, None)).unwrap();
        assert_eq!(
            c.finish_select(&ticket, Ok(stage_json())).unwrap(),
            SelectOutcome::Started { index: 0, total: 3 }
        );
    }

    #[test]
    fn test_unknown_type_is_contained() {
        let (mut c, mut rx) = controller(Arc::new(MemoryStore::new()));
        let ticket = c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        let doc = json!({ "exercises": [{ "id": "x", "type": "essay", "question": "Write" }] });

        c.finish_select(&ticket, Ok(doc)).unwrap();
        assert_eq!(c.state(), ProgressionState::Running { index: 0, advancing: false });
        assert!(matches!(c.engine().mount().view(), Some(View::Error { .. })));
        assert_eq!(c.handle_action(Control::Check).unwrap(), ActionOutcome::Ignored);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, PlayerEvent::Error(p) if p.kind == "unknown_exercise_type")));
    }

    #[test]
    fn test_persistence_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_saves(true);
        let (c, _rx) = started(Arc::clone(&store));
        assert_eq!(c.state(), ProgressionState::Running { index: 0, advancing: false });
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn test_action_without_stage() {
        let (mut c, _rx) = controller(Arc::new(MemoryStore::new()));
        assert!(matches!(c.handle_action(Control::Check), Err(VoxError::NoActiveStage)));

        c.begin_select(location(1), &stage_ref(1, None)).unwrap();
        let err = c.handle_action(Control::Check).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition: cannot go from loading to answering");
    }

    #[test]
    fn test_language_settings_and_reset() {
        let store = Arc::new(MemoryStore::new());
        let (mut c, _rx) = controller(Arc::clone(&store));

        c.set_languages(Some("fr".into()), Some("en".into()));
        assert!(c.unlock_language("fr"));
        assert!(!c.unlock_language("fr"));
        let stored = store.stored().unwrap();
        assert_eq!(stored.target_language.as_deref(), Some("fr"));
        assert!(stored.unlocked_languages.contains("fr"));

        c.reset_progress().unwrap();
        assert!(c.progress().unlocked_languages.is_empty());
        assert!(store.stored().is_none());
    }
}
