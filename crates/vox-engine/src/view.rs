//! View models, user controls, and the mount point boundary.
//!
//! The engine never draws anything itself. Strategies describe what should
//! be visible as a [`View`] and subscribe to the [`Control`]s they react
//! to; a [`MountPoint`] turns that into something a learner can see.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::{ExerciseKind, StageLocation};
use crate::events::{EventBroadcaster, PlayerEvent};

// ============================================================================
// Controls
// ============================================================================

/// Something the learner can activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    /// An answer option, by index.
    Option(usize),
    /// A word bank tile, by index.
    Word(usize),
    /// A left column item, by index.
    Left(usize),
    /// A right column item, by index.
    Right(usize),
    /// Acknowledge ("Got it").
    Confirm,
    /// Submit the current answer.
    Check,
    /// Start over within the exercise.
    Reset,
    /// Start speech capture.
    Mic,
    /// Turn a card over.
    Flip,
    /// Play the audio again.
    Replay,
}

/// Handle to a control subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Live control subscriptions of a mount point.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    next: u64,
    active: BTreeMap<ListenerId, Control>,
}

impl Listeners {
    /// Registers a subscription.
    pub fn add(&mut self, control: Control) -> ListenerId {
        self.next += 1;
        let id = ListenerId(self.next);
        self.active.insert(id, control);
        id
    }

    /// Releases a subscription. Returns `false` if it was not live.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Returns `true` if any live subscription covers `control`.
    #[must_use]
    pub fn contains(&self, control: Control) -> bool {
        self.active.values().any(|c| *c == control)
    }

    /// Controls with a live subscription, in subscription order.
    #[must_use]
    pub fn controls(&self) -> Vec<Control> {
        self.active.values().copied().collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

// ============================================================================
// Views
// ============================================================================

/// Visual state of a selectable tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileState {
    /// Not interacted with.
    Idle,
    /// Currently selected.
    Selected,
    /// Already placed and no longer selectable.
    Used,
    /// Part of a correct pair.
    Matched,
    /// Part of an incorrect attempt, about to revert.
    Mismatched,
}

/// A labelled, selectable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Text shown on the tile.
    pub label: String,
    /// Visual state.
    pub state: TileState,
}

impl Tile {
    /// Creates an idle tile.
    #[must_use]
    pub fn idle(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: TileState::Idle,
        }
    }

    /// Creates a tile in the given state.
    #[must_use]
    pub fn with_state(label: impl Into<String>, state: TileState) -> Self {
        Self {
            label: label.into(),
            state,
        }
    }
}

/// Type-specific part of an exercise view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ViewBody {
    /// One option to pick, optionally after listening to audio.
    Choices {
        /// Options in content order.
        options: Vec<String>,
        /// Resolved audio URL, for listening exercises.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
    },
    /// A sentence with one blank and options to fill it.
    TapFill {
        /// The sentence with the blank filled or shown as `___`.
        sentence: String,
        /// Options, with the current selection marked.
        options: Vec<Tile>,
    },
    /// Speak the prompt.
    Pronunciation {
        /// Whether the microphone can be activated.
        mic_enabled: bool,
        /// Whether a capture is in progress.
        listening: bool,
    },
    /// A two-sided card.
    Flashcard {
        /// Front text.
        front: String,
        /// Back text.
        back: String,
        /// Whether the back is showing.
        flipped: bool,
    },
    /// Assemble a sentence from a word bank.
    SentenceOrder {
        /// Word bank in shuffled order.
        bank: Vec<Tile>,
        /// Words placed so far.
        assembled: Vec<String>,
    },
    /// Pair the items of two columns.
    Matching {
        /// Left column in shuffled order.
        left: Vec<Tile>,
        /// Right column in shuffled order.
        right: Vec<Tile>,
    },
}

/// What a strategy wants the learner to see for one exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseView {
    /// Exercise identifier.
    pub exercise_id: String,
    /// Exercise type.
    pub exercise_type: ExerciseKind,
    /// Prompt text.
    pub prompt: String,
    /// Resolved image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Type-specific content.
    pub body: ViewBody,
    /// Status line shown under the exercise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Everything a mount point can show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    /// An exercise in progress.
    Exercise(ExerciseView),
    /// An inline error in place of an exercise.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// The end-of-stage screen.
    StageComplete {
        /// The completed stage.
        location: StageLocation,
        /// Stage numbers unlocked by completing it.
        unlocked: Vec<u32>,
    },
}

impl View {
    /// Returns the exercise view, if this is one.
    #[must_use]
    pub const fn as_exercise(&self) -> Option<&ExerciseView> {
        match self {
            Self::Exercise(view) => Some(view),
            _ => None,
        }
    }
}

fn write_tiles(f: &mut fmt::Formatter<'_>, tiles: &[Tile]) -> fmt::Result {
    for (i, tile) in tiles.iter().enumerate() {
        match tile.state {
            TileState::Idle => writeln!(f, "  [{i}] {}", tile.label)?,
            state => writeln!(f, "  [{i}] {} ({})", tile.label, tile_state_name(state))?,
        }
    }
    Ok(())
}

const fn tile_state_name(state: TileState) -> &'static str {
    match state {
        TileState::Idle => "idle",
        TileState::Selected => "selected",
        TileState::Used => "used",
        TileState::Matched => "matched",
        TileState::Mismatched => "mismatched",
    }
}

/// Plain-text rendering, used by the CLI and in tests.
impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { message } => writeln!(f, "error: {message}"),
            Self::StageComplete { location, unlocked } => {
                let unlocked: Vec<String> = unlocked.iter().map(ToString::to_string).collect();
                writeln!(
                    f,
                    "stage complete: {location} (unlocked {})",
                    unlocked.join(", ")
                )
            }
            Self::Exercise(view) => {
                writeln!(
                    f,
                    "{} {}: {}",
                    view.exercise_type, view.exercise_id, view.prompt
                )?;
                if let Some(image) = &view.image {
                    writeln!(f, "  image: {image}")?;
                }
                match &view.body {
                    ViewBody::Choices { options, audio } => {
                        if let Some(audio) = audio {
                            writeln!(f, "  audio: {audio}")?;
                        }
                        for (i, option) in options.iter().enumerate() {
                            writeln!(f, "  [{i}] {option}")?;
                        }
                    }
                    ViewBody::TapFill { sentence, options } => {
                        writeln!(f, "  {sentence}")?;
                        write_tiles(f, options)?;
                    }
                    ViewBody::Pronunciation {
                        mic_enabled,
                        listening,
                    } => {
                        let mic = match (listening, mic_enabled) {
                            (true, _) => "listening",
                            (false, true) => "ready",
                            (false, false) => "off",
                        };
                        writeln!(f, "  mic: {mic}")?;
                    }
                    ViewBody::Flashcard {
                        front,
                        back,
                        flipped,
                    } => {
                        if *flipped {
                            writeln!(f, "  back: {back}")?;
                        } else {
                            writeln!(f, "  front: {front}")?;
                        }
                    }
                    ViewBody::SentenceOrder { bank, assembled } => {
                        writeln!(f, "  > {}", assembled.join(" "))?;
                        write_tiles(f, bank)?;
                    }
                    ViewBody::Matching { left, right } => {
                        writeln!(f, "  left:")?;
                        write_tiles(f, left)?;
                        writeln!(f, "  right:")?;
                        write_tiles(f, right)?;
                    }
                }
                if let Some(status) = &view.status {
                    writeln!(f, "  status: {status}")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Mount points
// ============================================================================

/// The surface an exercise is rendered onto.
///
/// Besides showing views, the mount point is the source of user actions:
/// a control only reaches the engine while someone listens to it.
pub trait MountPoint {
    /// Replaces the visible view.
    fn present(&mut self, view: View);

    /// Shows an inline error in place of the exercise.
    fn report_error(&mut self, message: &str);

    /// Clears the surface.
    fn clear(&mut self);

    /// Subscribes to a control.
    fn listen(&mut self, control: Control) -> ListenerId;

    /// Releases a subscription. Releasing twice is harmless.
    fn unlisten(&mut self, id: ListenerId);

    /// Returns `true` if a live subscription covers `control`.
    fn is_listening(&self, control: Control) -> bool;

    /// Starts playing audio from `url`.
    fn play_audio(&mut self, url: &str);

    /// Stops audio playback.
    fn stop_audio(&mut self);
}

/// A call made on a [`RecordingMount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    /// `present`
    Present(View),
    /// `report_error`
    ReportError(String),
    /// `clear`
    Clear,
    /// `listen`
    Listen(ListenerId, Control),
    /// `unlisten`
    Unlisten(ListenerId),
    /// `play_audio`
    PlayAudio(String),
    /// `stop_audio`
    StopAudio,
}

/// Mount point that records every call, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingMount {
    calls: Vec<MountCall>,
    listeners: Listeners,
    view: Option<View>,
    audio: Option<String>,
}

impl RecordingMount {
    /// Creates an empty recording mount.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> &[MountCall] {
        &self.calls
    }

    /// Drains the recorded calls.
    pub fn take_calls(&mut self) -> Vec<MountCall> {
        std::mem::take(&mut self.calls)
    }

    /// The currently visible view.
    #[must_use]
    pub const fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    /// Live subscriptions.
    #[must_use]
    pub const fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// The audio URL currently playing.
    #[must_use]
    pub fn playing(&self) -> Option<&str> {
        self.audio.as_deref()
    }
}

impl MountPoint for RecordingMount {
    fn present(&mut self, view: View) {
        self.calls.push(MountCall::Present(view.clone()));
        self.view = Some(view);
    }

    fn report_error(&mut self, message: &str) {
        self.calls.push(MountCall::ReportError(message.to_string()));
        self.view = Some(View::Error {
            message: message.to_string(),
        });
    }

    fn clear(&mut self) {
        self.calls.push(MountCall::Clear);
        self.view = None;
    }

    fn listen(&mut self, control: Control) -> ListenerId {
        let id = self.listeners.add(control);
        self.calls.push(MountCall::Listen(id, control));
        id
    }

    fn unlisten(&mut self, id: ListenerId) {
        self.listeners.remove(id);
        self.calls.push(MountCall::Unlisten(id));
    }

    fn is_listening(&self, control: Control) -> bool {
        self.listeners.contains(control)
    }

    fn play_audio(&mut self, url: &str) {
        self.calls.push(MountCall::PlayAudio(url.to_string()));
        self.audio = Some(url.to_string());
    }

    fn stop_audio(&mut self) {
        self.calls.push(MountCall::StopAudio);
        self.audio = None;
    }
}

/// Mount point of the player server: keeps the current view and pushes
/// every change to connected clients.
#[derive(Debug, Clone)]
pub struct SharedMount {
    listeners: Listeners,
    view: Option<View>,
    audio: Option<String>,
    events: EventBroadcaster,
}

impl SharedMount {
    /// Creates a mount that publishes through `events`.
    #[must_use]
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            listeners: Listeners::default(),
            view: None,
            audio: None,
            events,
        }
    }

    /// The currently visible view.
    #[must_use]
    pub const fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    /// Controls the learner can currently use.
    #[must_use]
    pub fn controls(&self) -> Vec<Control> {
        self.listeners.controls()
    }

    /// The audio URL currently playing.
    #[must_use]
    pub fn playing(&self) -> Option<&str> {
        self.audio.as_deref()
    }
}

impl MountPoint for SharedMount {
    fn present(&mut self, view: View) {
        self.view = Some(view.clone());
        self.events.send(PlayerEvent::view(Some(view)));
    }

    fn report_error(&mut self, message: &str) {
        self.present(View::Error {
            message: message.to_string(),
        });
    }

    fn clear(&mut self) {
        if self.view.take().is_some() {
            self.events.send(PlayerEvent::view(None));
        }
    }

    fn listen(&mut self, control: Control) -> ListenerId {
        self.listeners.add(control)
    }

    fn unlisten(&mut self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn is_listening(&self, control: Control) -> bool {
        self.listeners.contains(control)
    }

    fn play_audio(&mut self, url: &str) {
        self.audio = Some(url.to_string());
        self.events.send(PlayerEvent::audio(Some(url.to_string())));
    }

    fn stop_audio(&mut self) {
        if self.audio.take().is_some() {
            self.events.send(PlayerEvent::audio(None));
        }
    }
}
