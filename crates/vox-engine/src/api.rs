//! HTTP API of the player.
//!
//! Front-ends drive a [`PlayerSession`] through these endpoints and follow
//! it through the `/ws` event stream.
//!
//! # Endpoints
//!
//! - `GET /api/status` - Session snapshot
//! - `GET /api/menu` - Stage menu for the target language
//! - `POST /api/stage` - Start (or resume) a stage
//! - `POST /api/action` - Deliver a learner action
//! - `POST /api/speech` - Complete a bridged speech capture
//! - `POST /api/menu/return` - Leave the current stage
//! - `POST /api/progress/languages` - Set target/translation language
//! - `POST /api/progress/unlock` - Unlock a language
//! - `POST /api/progress/reset` - Forget all progress
//! - `GET /api/translation/{exerciseId}` - Translation of an exercise
//! - `GET /ws` - Event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vox_content::{DirFetcher, MediaResolver};
//! use vox_engine::{create_router, MemoryStore, PlayerSession, SessionOptions};
//!
//! # async fn example() {
//! let options = SessionOptions::new("manifest.json", MediaResolver::new("https://cdn.example/", &[]));
//! let session = PlayerSession::new(options, Arc::new(DirFetcher::new("content")), Arc::new(MemoryStore::new()));
//!
//! let router = create_router(session);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::content::StageLocation;
use crate::error::VoxError;
use crate::events::ws_handler;
use crate::menu::StageMenu;
use crate::progress::UserProgress;
use crate::progression::{ProgressionState, SelectOutcome};
use crate::session::{ActionReport, PlayerSession, SessionSnapshot};
use crate::view::Control;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query of the menu endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuQuery {
    /// Language to show instead of the target language.
    pub language: Option<String>,
}

/// Request body for the stage endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    /// Target language code.
    pub language: String,
    /// Level key.
    pub level: String,
    /// Section key.
    pub section: String,
    /// Stage number.
    pub stage: u32,
    /// Pick up at the saved exercise.
    #[serde(default)]
    pub resume: bool,
}

/// Response body for the stage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResponse {
    /// Whether this request started the stage (`false` if a later
    /// selection superseded it).
    pub started: bool,
    /// First mounted exercise.
    pub index: Option<usize>,
    /// Number of exercises.
    pub total: Option<usize>,
}

/// Request body for the action endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    /// The control the learner used.
    pub control: Control,
}

/// Request body for the speech endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    /// Id from the `listen_requested` event.
    pub request_id: u64,
    /// What was heard.
    pub transcript: Option<String>,
    /// Why nothing was heard.
    pub error: Option<String>,
}

/// Response body for the speech endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    /// Whether a capture was waiting for this result.
    pub accepted: bool,
}

/// Response body for the return-to-menu endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    /// Progression state.
    pub state: ProgressionState,
}

/// Request body for the languages endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguagesRequest {
    /// New target language.
    pub target: Option<String>,
    /// New translation language.
    pub translation: Option<String>,
}

/// Request body for the unlock endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRequest {
    /// Language to unlock.
    pub language: String,
}

/// Response body for the unlock endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    /// Whether anything changed.
    pub changed: bool,
}

/// Response body for the translation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    /// The exercise.
    pub exercise_id: String,
    /// Its translation.
    pub text: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind.
    pub kind: String,
    /// Description of the error.
    pub error: String,
    /// Whether trying again may succeed.
    pub retryable: bool,
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The session refused or failed the request.
    Player(VoxError),
    /// The manifest has nothing under the requested key.
    NotFound(String),
}

impl From<VoxError> for ApiError {
    fn from(err: VoxError) -> Self {
        Self::Player(err)
    }
}

const fn status_for(err: &VoxError) -> StatusCode {
    match err {
        VoxError::StageLocked { .. } => StatusCode::FORBIDDEN,
        VoxError::StageNotFound { .. } => StatusCode::NOT_FOUND,
        VoxError::ContentLoadFailure { .. } | VoxError::ContentParse { .. } => StatusCode::BAD_GATEWAY,
        VoxError::NoActiveStage | VoxError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        VoxError::SpeechUnavailable => StatusCode::NOT_IMPLEMENTED,
        VoxError::SpeechFailure { .. } | VoxError::UnknownExerciseType { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Player(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    warn!(kind = err.kind(), error = %err, "Request failed");
                }
                let body = ErrorResponse {
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                };
                (status, body)
            }
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    kind: "not_found".to_string(),
                    error: message,
                    retryable: false,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the event stream.
///
/// # Arguments
///
/// * `session` - The player session to drive
///
/// # Returns
///
/// An axum `Router` configured with:
/// - All API routes under `/api`
/// - The WebSocket stream at `/ws`
/// - CORS middleware so any front-end origin can connect
/// - Tracing middleware for request logging
pub fn create_router(session: Arc<PlayerSession>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route("/menu", get(handle_menu))
        .route("/menu/return", post(handle_return))
        .route("/stage", post(handle_stage))
        .route("/action", post(handle_action))
        .route("/speech", post(handle_speech))
        .route("/progress/languages", post(handle_languages))
        .route("/progress/unlock", post(handle_unlock))
        .route("/progress/reset", post(handle_reset))
        .route("/translation/:exercise_id", get(handle_translation));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(session)
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/status`.
async fn handle_status(State(session): State<Arc<PlayerSession>>) -> Json<SessionSnapshot> {
    Json(session.snapshot().await)
}

/// Handler for `GET /api/menu`.
async fn handle_menu(
    State(session): State<Arc<PlayerSession>>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<StageMenu>, ApiError> {
    let menu = session.menu(query.language.as_deref()).await?;
    menu.map(Json).ok_or_else(|| {
        let language = query.language.unwrap_or_default();
        ApiError::NotFound(format!("No content for language '{language}'"))
    })
}

/// Handler for `POST /api/stage`.
async fn handle_stage(
    State(session): State<Arc<PlayerSession>>,
    Json(request): Json<StageRequest>,
) -> Result<Json<StageResponse>, ApiError> {
    let location = StageLocation::new(request.language, request.level, request.section, request.stage);
    info!(stage = %location, resume = request.resume, "Stage requested");

    let response = match session.select_stage(location, request.resume).await? {
        SelectOutcome::Started { index, total } => StageResponse {
            started: true,
            index: Some(index),
            total: Some(total),
        },
        SelectOutcome::Stale => StageResponse {
            started: false,
            index: None,
            total: None,
        },
    };
    Ok(Json(response))
}

/// Handler for `POST /api/action`.
async fn handle_action(
    State(session): State<Arc<PlayerSession>>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionReport>, ApiError> {
    Ok(Json(session.act(request.control).await?))
}

/// Handler for `POST /api/speech`.
async fn handle_speech(
    State(session): State<Arc<PlayerSession>>,
    Json(request): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let result = match (request.transcript, request.error) {
        (_, Some(error)) => Err(VoxError::speech_failure(error)),
        (Some(transcript), None) => Ok(transcript),
        (None, None) => Err(VoxError::speech_failure("no transcript")),
    };
    let accepted = session.complete_speech(request.request_id, result)?;
    Ok(Json(SpeechResponse { accepted }))
}

/// Handler for `POST /api/menu/return`.
async fn handle_return(State(session): State<Arc<PlayerSession>>) -> Json<StateResponse> {
    Json(StateResponse {
        state: session.return_to_menu().await,
    })
}

/// Handler for `POST /api/progress/languages`.
async fn handle_languages(
    State(session): State<Arc<PlayerSession>>,
    Json(request): Json<LanguagesRequest>,
) -> Json<UserProgress> {
    Json(session.set_languages(request.target, request.translation).await)
}

/// Handler for `POST /api/progress/unlock`.
async fn handle_unlock(
    State(session): State<Arc<PlayerSession>>,
    Json(request): Json<UnlockRequest>,
) -> Json<UnlockResponse> {
    Json(UnlockResponse {
        changed: session.unlock_language(&request.language).await,
    })
}

/// Handler for `POST /api/progress/reset`.
async fn handle_reset(State(session): State<Arc<PlayerSession>>) -> Result<StatusCode, ApiError> {
    session.reset_progress().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `GET /api/translation/{exerciseId}`.
async fn handle_translation(
    State(session): State<Arc<PlayerSession>>,
    Path(exercise_id): Path<String>,
) -> Result<Json<TranslationResponse>, ApiError> {
    let text = session.translation(&exercise_id).await?;
    Ok(Json(TranslationResponse { exercise_id, text }))
}

// ============================================================================
// Tests
// ============================================================================
