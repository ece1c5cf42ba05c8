//! Player events and WebSocket streaming.
//!
//! Everything a front-end needs to follow a session is broadcast as a
//! [`PlayerEvent`]. Clients connected to `/ws` receive a `connected` event
//! with a full snapshot first, then every event as it happens.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes a session snapshot
//! - `view` - The visible view changed (or was cleared)
//! - `audio` - Audio playback started or stopped
//! - `feedback` - A submission was judged
//! - `feedback_cleared` - The feedback overlay should disappear
//! - `stage_complete` - Every exercise of a stage was answered
//! - `listen_requested` - The front-end should capture speech
//! - `progress_saved` - Progress was written to the store
//! - `error` - Something failed; the session carries on
//!
//! # Example
//!
//! ```
//! use vox_engine::events::{EventBroadcaster, PlayerEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(PlayerEvent::error("content_load_failure", "offline", true));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "error");
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::content::StageLocation;
use crate::error::VoxError;
use crate::session::{PlayerSession, SessionSnapshot};
use crate::view::View;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it is right now.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `view` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewPayload {
    /// The new view, or `None` if the surface was cleared.
    pub view: Option<View>,
}

/// Payload for the `audio` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    /// URL to play, or `None` to stop.
    pub url: Option<String>,
}

/// Payload for the `feedback` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPayload {
    /// Identifies this overlay; `feedback_cleared` refers back to it.
    pub feedback_id: u64,
    /// The judged exercise.
    pub exercise_id: String,
    /// Whether the submission was correct.
    pub correct: bool,
    /// How long the overlay should stay up.
    pub clear_after_ms: u64,
}

/// Payload for the `feedback_cleared` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackClearedPayload {
    /// The overlay to remove.
    pub feedback_id: u64,
}

/// Payload for the `stage_complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCompletePayload {
    /// The completed stage.
    pub location: StageLocation,
    /// Stage numbers unlocked by completing it.
    pub unlocked: Vec<u32>,
}

/// Payload for the `listen_requested` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenRequestedPayload {
    /// Echo this back when posting the transcript.
    pub request_id: u64,
    /// Recognition language.
    pub language: String,
}

/// Payload for the `progress_saved` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSavedPayload {
    /// Timestamp of the saved progress.
    pub updated_at: DateTime<Utc>,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error kind.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether trying again may succeed.
    pub retryable: bool,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events streamed to front-ends.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// The visible view changed.
    View(ViewPayload),
    /// Audio playback changed.
    Audio(AudioPayload),
    /// A submission was judged.
    Feedback(FeedbackPayload),
    /// The feedback overlay should be removed.
    FeedbackCleared(FeedbackClearedPayload),
    /// A stage was completed.
    StageComplete(StageCompletePayload),
    /// Speech capture is needed.
    ListenRequested(ListenRequestedPayload),
    /// Progress was persisted.
    ProgressSaved(ProgressSavedPayload),
    /// Something failed.
    Error(ErrorPayload),
}

impl PlayerEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `View` event.
    #[must_use]
    pub const fn view(view: Option<View>) -> Self {
        Self::View(ViewPayload { view })
    }

    /// Creates an `Audio` event.
    #[must_use]
    pub const fn audio(url: Option<String>) -> Self {
        Self::Audio(AudioPayload { url })
    }

    /// Creates a `Feedback` event.
    #[must_use]
    pub fn feedback(feedback_id: u64, exercise_id: impl Into<String>, correct: bool, clear_after: Duration) -> Self {
        Self::Feedback(FeedbackPayload {
            feedback_id,
            exercise_id: exercise_id.into(),
            correct,
            clear_after_ms: u64::try_from(clear_after.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Creates a `FeedbackCleared` event.
    #[must_use]
    pub const fn feedback_cleared(feedback_id: u64) -> Self {
        Self::FeedbackCleared(FeedbackClearedPayload { feedback_id })
    }

    /// Creates a `StageComplete` event.
    #[must_use]
    pub const fn stage_complete(location: StageLocation, unlocked: Vec<u32>) -> Self {
        Self::StageComplete(StageCompletePayload { location, unlocked })
    }

    /// Creates a `ListenRequested` event.
    #[must_use]
    pub fn listen_requested(request_id: u64, language: impl Into<String>) -> Self {
        Self::ListenRequested(ListenRequestedPayload {
            request_id,
            language: language.into(),
        })
    }

    /// Creates a `ProgressSaved` event.
    #[must_use]
    pub const fn progress_saved(updated_at: DateTime<Utc>) -> Self {
        Self::ProgressSaved(ProgressSavedPayload { updated_at })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(kind: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Error(ErrorPayload {
            kind: kind.into(),
            message: message.into(),
            retryable,
        })
    }

    /// Creates an `Error` event describing `err`.
    #[must_use]
    pub fn from_error(err: &VoxError) -> Self {
        Self::error(err.kind(), err.to_string(), err.is_retryable())
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::View(_) => "view",
            Self::Audio(_) => "audio",
            Self::Feedback(_) => "feedback",
            Self::FeedbackCleared(_) => "feedback_cleared",
            Self::StageComplete(_) => "stage_complete",
            Self::ListenRequested(_) => "listen_requested",
            Self::ProgressSaved(_) => "progress_saved",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts player events to every connected client.
///
/// Events are not kept for clients that connect later; those get a
/// snapshot in their `connected` event instead.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. Returns the number of receivers; 0 means
    /// nobody is listening, which is fine.
    pub fn send(&self, event: PlayerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(session): State<Arc<PlayerSession>>,
) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

/// Streams events to one client.
///
/// Subscribes before taking the snapshot so nothing that happens in
/// between is lost. Pings every 30 seconds and gives up after three
/// unanswered pings.
async fn handle_socket(socket: WebSocket, session: Arc<PlayerSession>) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_receiver = session.events().subscribe();
    let connected = PlayerEvent::connected(session.snapshot().await);
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize connected event");
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent snapshot");

    let mut heartbeat_interval = interval(Duration::from_secs(30));
    // The first tick completes immediately.
    heartbeat_interval.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring message from client; actions go through the HTTP API");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(event = event.event_name(), error = %e, "Failed to serialize event");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Client lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!(missed = MAX_MISSED_PONGS, "Client stopped answering pings, closing");
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
