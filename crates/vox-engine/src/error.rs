//! Error types for the Vox exercise engine.
//!
//! Every failure in the player is recoverable: content failures leave
//! navigation where it was, unknown exercise types are reported inline,
//! speech failures reset the microphone, and persistence failures are
//! logged and swallowed. The classification helpers at the bottom of this
//! module encode that policy.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, VoxError>;

/// Errors that can occur while playing exercises.
#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your vox.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Content Errors
    // ========================================================================
    /// The manifest or a stage could not be retrieved.
    #[error("Failed to load content '{identifier}': {message}\n\nSuggestion: Check your connection and try again")]
    ContentLoadFailure {
        /// The identifier that was requested.
        identifier: String,
        /// Description of the failure.
        message: String,
    },

    /// Content was retrieved but does not have the expected shape.
    #[error("Malformed content '{identifier}': {message}\n\nSuggestion: Validate the file with 'vox check {identifier}'")]
    ContentParse {
        /// The identifier the content came from.
        identifier: String,
        /// Description of the shape mismatch.
        message: String,
    },

    /// An exercise declares a type the player does not know.
    #[error("Unknown exercise type '{tag}'")]
    UnknownExerciseType {
        /// The unrecognized type tag.
        tag: String,
    },

    // ========================================================================
    // Navigation Errors
    // ========================================================================
    /// The requested stage is locked for this language.
    #[error("Stage {stage} of {language}/{level}/{section} is locked\n\nSuggestion: Complete the previous stage or unlock the language")]
    StageLocked {
        /// Target language code.
        language: String,
        /// Level key.
        level: String,
        /// Section identifier.
        section: String,
        /// Stage number.
        stage: u32,
    },

    /// The requested stage is not in the manifest.
    #[error("Stage {stage} of {language}/{level}/{section} does not exist")]
    StageNotFound {
        /// Target language code.
        language: String,
        /// Level key.
        level: String,
        /// Section identifier.
        section: String,
        /// Stage number.
        stage: u32,
    },

    /// An operation needs a running stage but none is active.
    #[error("No stage is running\n\nSuggestion: Select a stage from the menu first")]
    NoActiveStage,

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // Speech Errors
    // ========================================================================
    /// No speech recognizer is available.
    #[error("Speech recognition is not supported here\n\nSuggestion: Use a browser with speech recognition, or skip pronunciation exercises")]
    SpeechUnavailable,

    /// Recognition failed (device, permission, no speech, or timeout).
    #[error("Speech recognition failed: {message}")]
    SpeechFailure {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Progress could not be written.
    #[error("Failed to save progress to '{path}': {message}\n\nSuggestion: Check write permissions and available disk space")]
    PersistenceFailure {
        /// Path to the progress file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoxError {
    /// Creates a new `ConfigParseError`.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError`.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ContentLoadFailure`.
    #[must_use]
    pub fn content_load(identifier: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ContentLoadFailure {
            identifier: identifier.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new `ContentParse` error.
    #[must_use]
    pub fn content_parse(identifier: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ContentParse {
            identifier: identifier.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new `UnknownExerciseType` error.
    #[must_use]
    pub fn unknown_exercise_type(tag: impl Into<String>) -> Self {
        Self::UnknownExerciseType { tag: tag.into() }
    }

    /// Creates a new `SpeechFailure`.
    #[must_use]
    pub fn speech_failure(message: impl Into<String>) -> Self {
        Self::SpeechFailure {
            message: message.into(),
        }
    }

    /// Creates a new `PersistenceFailure`.
    #[must_use]
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if the user can simply try the same thing again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContentLoadFailure { .. } | Self::SpeechFailure { .. }
        )
    }

    /// Returns `true` if this error should stop the process at startup.
    ///
    /// Nothing that happens once a session is running is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParseError { .. } => "config_parse",
            Self::ConfigValidationError { .. } => "config_validation",
            Self::ContentLoadFailure { .. } => "content_load_failure",
            Self::ContentParse { .. } => "content_parse",
            Self::UnknownExerciseType { .. } => "unknown_exercise_type",
            Self::StageLocked { .. } => "stage_locked",
            Self::StageNotFound { .. } => "stage_not_found",
            Self::NoActiveStage => "no_active_stage",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::SpeechUnavailable => "speech_unavailable",
            Self::SpeechFailure { .. } => "speech_failure",
            Self::PersistenceFailure { .. } => "persistence_failure",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

impl From<vox_content::ContentError> for VoxError {
    fn from(err: vox_content::ContentError) -> Self {
        let identifier = match &err {
            vox_content::ContentError::NotFound { url }
            | vox_content::ContentError::Status { url, .. }
            | vox_content::ContentError::Network { url, .. }
            | vox_content::ContentError::InvalidJson { url, .. } => url.clone(),
            vox_content::ContentError::Exhausted { identifier, .. }
            | vox_content::ContentError::UnsupportedIdentifier { identifier } => {
                identifier.clone()
            }
            vox_content::ContentError::Client(_) | vox_content::ContentError::Io(_) => {
                String::from("<content source>")
            }
        };
        Self::content_load(identifier, err)
    }
}
