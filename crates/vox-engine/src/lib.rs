//! Vox Exercise Engine
//!
//! Plays language-learning exercises: judges answers, gates stages, walks
//! a learner through a stage, and serves the player over HTTP and
//! WebSocket.

pub mod access;
pub mod answer;
pub mod api;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod events;
pub mod menu;
pub mod progress;
pub mod progression;
pub mod session;
pub mod speech;
pub mod strategy;
pub mod view;

pub use access::{can_enter, is_stage_accessible, unlock_language, unlock_stage, LockConfig};
pub use answer::{check_answer, normalize, normalize_str};
pub use api::{create_router, ErrorResponse};
pub use config::{Config, ContentConfig, SpeechConfig, Timings};
pub use content::{
    Exercise, ExerciseKind, ExerciseType, Manifest, Media, Pair, Pairs, Stage, StageLocation, StageRef,
};
pub use engine::{EngineStep, ExerciseEngine, SpeechTicket, TimerTicket, Verdict};
pub use error::{Result, VoxError};
pub use events::{EventBroadcaster, PlayerEvent};
pub use menu::StageMenu;
pub use progress::{JsonFileStore, MemoryStore, ProgressStore, UserProgress};
pub use progression::{
    ActionOutcome, AdvanceOutcome, AdvanceTicket, ProgressionController, ProgressionState, SelectOutcome,
    SelectTicket,
};
pub use session::{content_fetcher, ActionReport, PlayerSession, SessionOptions, SessionSnapshot, NO_TRANSLATION};
pub use speech::{BridgedSpeech, SpeechToText, TimeoutSpeech, UnsupportedSpeech};
pub use strategy::{ExerciseStrategy, RenderContext};
pub use view::{Control, MountPoint, RecordingMount, SharedMount, View};
