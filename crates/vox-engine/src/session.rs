//! The player session: async driver around the progression controller.
//!
//! The controller and engine are synchronous and live behind a
//! `tokio::sync::Mutex`. Everything that waits (content fetches, speech
//! capture, the feedback-clear and advance timers) happens with the lock
//! released. When the wait is over the session re-locks and hands the
//! result over together with its ticket, and the controller drops results
//! that belong to an exercise or stage that is no longer current.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vox_content::{ContentFetcher, DirFetcher, HttpFetcher, MediaResolver, SourceConfig};

use crate::config::{Config, Timings};
use crate::content::{Manifest, StageLocation};
use crate::engine::{ExerciseEngine, SpeechTicket, TimerTicket};
use crate::error::{Result, VoxError};
use crate::events::{EventBroadcaster, PlayerEvent};
use crate::menu::StageMenu;
use crate::progress::{JsonFileStore, ProgressStore, UserProgress};
use crate::progression::{
    ActionOutcome, AdvanceOutcome, AdvanceTicket, FeedbackTicket, ProgressionController, ProgressionState,
    SelectOutcome,
};
use crate::speech::{BridgedSpeech, SpeechToText, TimeoutSpeech};
use crate::strategy::RenderContext;
use crate::view::{Control, SharedMount, View};

/// Shown when a translation file has no entry for an exercise.
pub const NO_TRANSLATION: &str = "No translation available.";

/// Everything a front-end needs to draw the player from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Progression state.
    pub state: ProgressionState,
    /// Selected stage.
    pub location: Option<StageLocation>,
    /// Index of the mounted exercise.
    pub index: Option<usize>,
    /// Number of exercises in the stage.
    pub total: Option<usize>,
    /// The visible view.
    pub view: Option<View>,
    /// Controls the learner can use right now.
    pub controls: Vec<Control>,
    /// The learner's progress.
    pub progress: UserProgress,
}

/// Response to a learner action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    /// What the action led to (`ignored`, `pending`, `retry`, `advance`,
    /// `listen`, `deferred`).
    pub step: String,
    /// The verdict, when one was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    /// Progression state after the action.
    pub state: ProgressionState,
}

/// Session settings that do not belong to a collaborator.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Identifier of the content manifest.
    pub manifest: String,
    /// Translation file identifier per translation language.
    pub translations: BTreeMap<String, String>,
    /// Translation language used until the learner picks one.
    pub default_translation_language: String,
    /// Feedback and progression timings.
    pub timings: Timings,
    /// Speech capture timeout.
    pub speech_timeout: Duration,
    /// Rendering defaults.
    pub render: RenderContext,
}

impl SessionOptions {
    /// Options with default timings and no translations.
    #[must_use]
    pub fn new(manifest: impl Into<String>, media: MediaResolver) -> Self {
        let config = Config::default();
        Self {
            manifest: manifest.into(),
            translations: BTreeMap::new(),
            default_translation_language: config.default_translation_language,
            timings: config.timings,
            speech_timeout: config.speech.timeout(),
            render: RenderContext::new(media)
                .with_mismatch_revert(config.timings.mismatch_revert())
                .with_fallback_voice_language(config.speech.fallback_language),
        }
    }

    /// Options taken from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let media = MediaResolver::new(config.content.cdn_base.as_str(), &config.content.gateways);
        Self {
            manifest: config.manifest.clone(),
            translations: config.translations.clone(),
            default_translation_language: config.default_translation_language.clone(),
            timings: config.timings,
            speech_timeout: config.speech.timeout(),
            render: RenderContext::new(media)
                .with_mismatch_revert(config.timings.mismatch_revert())
                .with_fallback_voice_language(config.speech.fallback_language.clone()),
        }
    }

    /// Replaces the timings, keeping the mismatch delay in sync.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self.render.mismatch_revert = timings.mismatch_revert();
        self
    }

    /// Adds a translation file for `language`.
    #[must_use]
    pub fn with_translation(mut self, language: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.translations.insert(language.into(), identifier.into());
        self
    }
}

/// One learner's player.
pub struct PlayerSession {
    options: SessionOptions,
    fetcher: Arc<dyn ContentFetcher>,
    speech: Arc<dyn SpeechToText>,
    bridge: Option<BridgedSpeech>,
    events: EventBroadcaster,
    controller: Mutex<ProgressionController<SharedMount>>,
    manifest: Mutex<Option<Arc<Manifest>>>,
    translations: Mutex<HashMap<String, Arc<HashMap<String, String>>>>,
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("manifest", &self.options.manifest)
            .field("bridged_speech", &self.bridge.is_some())
            .finish_non_exhaustive()
    }
}

impl PlayerSession {
    /// Creates a session whose speech capture is bridged to the front-end.
    pub fn new(
        options: SessionOptions,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn ProgressStore>,
    ) -> Arc<Self> {
        let events = EventBroadcaster::default();
        let bridge = BridgedSpeech::new(events.clone());
        let speech = Arc::new(TimeoutSpeech::new(bridge.clone(), options.speech_timeout));
        Self::build(options, fetcher, store, speech, Some(bridge), events)
    }

    /// Creates a session with its own speech recognizer.
    pub fn with_speech(
        options: SessionOptions,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn ProgressStore>,
        speech: Arc<dyn SpeechToText>,
    ) -> Arc<Self> {
        let speech = Arc::new(TimeoutSpeech::new(speech, options.speech_timeout));
        Self::build(options, fetcher, store, speech, None, EventBroadcaster::default())
    }

    /// Creates a session from configuration: content as configured, a
    /// JSON progress file relative to `base_dir`, and bridged speech.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Arc<Self>> {
        let fetcher = content_fetcher(config, base_dir)?;
        let store = Arc::new(JsonFileStore::new(base_dir.join(&config.state_file)));
        Ok(Self::new(SessionOptions::from_config(config), fetcher, store))
    }

    fn build(
        options: SessionOptions,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn ProgressStore>,
        speech: Arc<dyn SpeechToText>,
        bridge: Option<BridgedSpeech>,
        events: EventBroadcaster,
    ) -> Arc<Self> {
        let controller = ProgressionController::new(
            ExerciseEngine::new(SharedMount::new(events.clone())),
            store,
            events.clone(),
            options.render.clone(),
            options.timings,
        );
        Arc::new(Self {
            options,
            fetcher,
            speech,
            bridge,
            events,
            controller: Mutex::new(controller),
            manifest: Mutex::new(None),
            translations: Mutex::new(HashMap::new()),
        })
    }

    /// The session's event stream.
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Captures the whole session state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let controller = self.controller.lock().await;
        let mount = controller.engine().mount();
        let index = match controller.state() {
            ProgressionState::Running { index, .. } => Some(index),
            _ => None,
        };
        SessionSnapshot {
            state: controller.state(),
            location: controller.location().cloned(),
            index,
            total: controller.total(),
            view: mount.view().cloned(),
            controls: mount.controls(),
            progress: controller.progress().clone(),
        }
    }

    /// The content manifest, fetched on first use. A failed fetch is not
    /// remembered.
    pub async fn manifest(&self) -> Result<Arc<Manifest>> {
        let mut cached = self.manifest.lock().await;
        if let Some(manifest) = cached.as_ref() {
            return Ok(Arc::clone(manifest));
        }

        let identifier = self.options.manifest.as_str();
        let value = self.fetcher.fetch(identifier).await.map_err(|e| {
            warn!(manifest = identifier, error = %e, "Failed to load manifest");
            VoxError::from(e)
        })?;
        let manifest = Arc::new(Manifest::from_value(identifier, value)?);
        info!(manifest = identifier, languages = manifest.languages.len(), "Manifest loaded");
        *cached = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// The stage menu for `language` (default: the learner's target
    /// language). `None` if the manifest does not have that language.
    pub async fn menu(&self, language: Option<&str>) -> Result<Option<StageMenu>> {
        let manifest = self.manifest().await?;
        let controller = self.controller.lock().await;
        Ok(StageMenu::build(&manifest, controller.progress(), language))
    }

    /// Selects a stage and waits until its first exercise is mounted.
    ///
    /// With `resume`, starts at the saved exercise when the resume cursor
    /// points at this stage.
    ///
    /// # Errors
    ///
    /// `StageNotFound` if the manifest has no such stage, `StageLocked` if
    /// the learner may not enter it, `ContentLoadFailure` if the manifest
    /// or the stage cannot be loaded.
    pub async fn select_stage(&self, location: StageLocation, resume: bool) -> Result<SelectOutcome> {
        let manifest = self.manifest().await?;
        let stage_ref = manifest
            .stage(&location)
            .cloned()
            .ok_or_else(|| location.not_found())?;

        let ticket = {
            let mut controller = self.controller.lock().await;
            if resume {
                controller.begin_resume(location, &stage_ref)?
            } else {
                controller.begin_select(location, &stage_ref)?
            }
        };

        let fetched = self
            .fetcher
            .fetch(ticket.identifier())
            .await
            .map_err(VoxError::from);

        self.controller.lock().await.finish_select(&ticket, fetched)
    }

    /// Delivers a learner action and schedules whatever it asks for.
    ///
    /// # Errors
    ///
    /// `NoActiveStage` when no stage is running.
    pub async fn act(self: &Arc<Self>, control: Control) -> Result<ActionReport> {
        let (outcome, state) = {
            let mut controller = self.controller.lock().await;
            let outcome = controller.handle_action(control)?;
            (outcome, controller.state())
        };
        let report = ActionReport {
            step: outcome.name().to_string(),
            correct: outcome.correct(),
            state,
        };
        self.follow_up(outcome);
        Ok(report)
    }

    fn follow_up(self: &Arc<Self>, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Ignored | ActionOutcome::Pending => {}
            ActionOutcome::Retry(feedback) => self.schedule_feedback_clear(feedback),
            ActionOutcome::Advance { feedback, advance } => {
                self.schedule_feedback_clear(feedback);
                self.schedule_advance(advance);
            }
            ActionOutcome::Listen(ticket) => self.spawn_capture(ticket),
            ActionOutcome::Deferred(ticket) => self.schedule_timer(ticket),
        }
    }

    fn schedule_feedback_clear(&self, feedback: FeedbackTicket) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(feedback.delay).await;
            events.send(PlayerEvent::feedback_cleared(feedback.id));
        });
    }

    fn schedule_advance(self: &Arc<Self>, ticket: AdvanceTicket) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            if let AdvanceOutcome::Stale = session.controller.lock().await.advance(&ticket) {
                debug!("Advance was superseded");
            }
        });
    }

    fn schedule_timer(self: &Arc<Self>, ticket: TimerTicket) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            let outcome = session.controller.lock().await.fire(&ticket);
            session.follow_up(outcome);
        });
    }

    fn spawn_capture(self: &Arc<Self>, ticket: SpeechTicket) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let result = session.speech.listen(&ticket.language).await;
            if let Err(e) = &result {
                info!(language = %ticket.language, error = %e, "Speech capture failed");
            }
            let outcome = session.controller.lock().await.resolve_speech(&ticket, result);
            session.follow_up(outcome);
        });
    }

    /// Hands a transcript (or a capture failure) from the front-end to
    /// the waiting capture.
    ///
    /// # Errors
    ///
    /// `SpeechUnavailable` if this session does not bridge speech.
    pub fn complete_speech(&self, request_id: u64, result: Result<String>) -> Result<bool> {
        let bridge = self.bridge.as_ref().ok_or(VoxError::SpeechUnavailable)?;
        Ok(bridge.complete(request_id, result))
    }

    /// Leaves the current stage.
    pub async fn return_to_menu(&self) -> ProgressionState {
        let mut controller = self.controller.lock().await;
        controller.return_to_menu();
        controller.state()
    }

    /// Changes the target and/or translation language.
    pub async fn set_languages(&self, target: Option<String>, translation: Option<String>) -> UserProgress {
        let mut controller = self.controller.lock().await;
        controller.set_languages(target, translation);
        controller.progress().clone()
    }

    /// Unlocks every stage of `language`.
    pub async fn unlock_language(&self, language: &str) -> bool {
        self.controller.lock().await.unlock_language(language)
    }

    /// Forgets all progress.
    pub async fn reset_progress(&self) -> Result<()> {
        self.controller.lock().await.reset_progress()
    }

    /// Translation of `exercise_id` in the learner's translation language.
    ///
    /// Translation files are flat `{ exerciseId: text }` documents, fetched
    /// once per language.
    ///
    /// # Errors
    ///
    /// `ContentLoadFailure` if the translation file cannot be loaded.
    pub async fn translation(&self, exercise_id: &str) -> Result<String> {
        let language = {
            let controller = self.controller.lock().await;
            controller
                .progress()
                .translation_language
                .clone()
                .unwrap_or_else(|| self.options.default_translation_language.clone())
        };
        let Some(identifier) = self.options.translations.get(&language) else {
            debug!(language, "No translation file configured");
            return Ok(NO_TRANSLATION.to_string());
        };

        let table = {
            let mut cache = self.translations.lock().await;
            if let Some(table) = cache.get(&language) {
                Arc::clone(table)
            } else {
                let value = self.fetcher.fetch(identifier).await?;
                let table = Arc::new(translation_table(value));
                cache.insert(language.clone(), Arc::clone(&table));
                table
            }
        };

        Ok(table
            .get(exercise_id)
            .cloned()
            .unwrap_or_else(|| NO_TRANSLATION.to_string()))
    }
}

/// Builds the configured content source: a local directory (relative to
/// `base_dir`) when `content.localDir` is set, HTTP otherwise.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn content_fetcher(config: &Config, base_dir: &Path) -> Result<Arc<dyn ContentFetcher>> {
    if let Some(dir) = &config.content.local_dir {
        return Ok(Arc::new(DirFetcher::new(base_dir.join(dir))));
    }
    let sources = SourceConfig::new(config.content.cdn_base.as_str(), config.content.gateways.clone())
        .with_timeout(Duration::from_secs(config.content.timeout_secs));
    Ok(Arc::new(HttpFetcher::new(sources)?))
}

fn translation_table(value: Value) -> HashMap<String, String> {
    match value {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(id, text)| match text {
                Value::String(text) => Some((id, text)),
                _ => None,
            })
            .collect(),
        _ => HashMap::new(),
    }
}
