//! Configuration types for the Vox player.
//!
//! Configuration lives in `vox.json`. Every field has a default, so a
//! missing file is not an error; a present but malformed file is.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "vox.json";

fn default_manifest() -> String {
    "schemas/manifest.json".to_string()
}

fn default_cdn_base() -> String {
    "https://raw.githubusercontent.com/MegaExplore/vox.github.io/main/".to_string()
}

fn default_gateways() -> Vec<String> {
    vec![
        "https://ipfs.io/ipfs/".to_string(),
        "https://cloudflare-ipfs.com/ipfs/".to_string(),
        "https://dweb.link/ipfs/".to_string(),
    ]
}

const fn default_content_timeout() -> u64 {
    15
}

fn default_state_file() -> String {
    ".vox/progress.json".to_string()
}

const fn default_feedback_ms() -> u64 {
    900
}

const fn default_advance_delay_ms() -> u64 {
    1000
}

const fn default_mismatch_revert_ms() -> u64 {
    600
}

const fn default_speech_timeout() -> u64 {
    10
}

fn default_voice_language() -> String {
    "en-US".to_string()
}

fn default_translation_language() -> String {
    "es".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Main configuration for the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Identifier of the content manifest.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Where content is fetched from.
    #[serde(default)]
    pub content: ContentConfig,

    /// Path to the progress file.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Translation file identifier per translation language.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,

    /// Feedback and progression timings.
    #[serde(default)]
    pub timings: Timings,

    /// Speech capture settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Translation language used until the learner picks one.
    #[serde(default = "default_translation_language")]
    pub default_translation_language: String,

    /// Port for the player API.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            content: ContentConfig::default(),
            state_file: default_state_file(),
            translations: BTreeMap::new(),
            timings: Timings::default(),
            speech: SpeechConfig::default(),
            default_translation_language: default_translation_language(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Loads configuration from `vox.json` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            VoxError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `vox.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a file path, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::ConfigParseError` for unreadable files or invalid
    /// JSON, and `VoxError::ConfigValidationError` for invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(VoxError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| VoxError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.manifest.trim().is_empty() {
            return Err(VoxError::config_validation(
                "manifest must not be empty",
                "Set manifest to the path, URL, or CID of your manifest in vox.json",
            ));
        }

        if self.content.local_dir.is_none() {
            if !self.content.cdn_base.starts_with("http://")
                && !self.content.cdn_base.starts_with("https://")
            {
                return Err(VoxError::config_validation(
                    format!("content.cdnBase must be an http(s) URL, got '{}'", self.content.cdn_base),
                    "Set content.cdnBase to a URL such as https://cdn.example.com/content/",
                ));
            }
            if self.content.gateways.is_empty() {
                return Err(VoxError::config_validation(
                    "content.gateways must list at least one gateway",
                    "Add a gateway such as https://ipfs.io/ipfs/ to content.gateways",
                ));
            }
        }

        if self.content.timeout_secs == 0 {
            return Err(VoxError::config_validation(
                "content.timeoutSecs must be greater than 0",
                "Set content.timeoutSecs to at least 1 second in vox.json",
            ));
        }

        for (name, value) in [
            ("timings.feedbackMs", self.timings.feedback_ms),
            ("timings.advanceDelayMs", self.timings.advance_delay_ms),
            ("timings.mismatchRevertMs", self.timings.mismatch_revert_ms),
        ] {
            if value == 0 {
                return Err(VoxError::config_validation(
                    format!("{name} must be greater than 0"),
                    format!("Set {name} to a positive number of milliseconds in vox.json"),
                ));
            }
        }

        if self.speech.timeout_secs == 0 {
            return Err(VoxError::config_validation(
                "speech.timeoutSecs must be greater than 0",
                "Set speech.timeoutSecs to at least 1 second in vox.json",
            ));
        }

        if self.speech.fallback_language.trim().is_empty() {
            return Err(VoxError::config_validation(
                "speech.fallbackLanguage must not be empty",
                "Use a BCP 47 tag such as en-US",
            ));
        }

        if self.state_file.trim().is_empty() {
            return Err(VoxError::config_validation(
                "stateFile must not be empty",
                "Provide a path for the progress file in vox.json",
            ));
        }

        Ok(())
    }
}

/// Content source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentConfig {
    /// Base URL of the static CDN for relative identifiers.
    #[serde(default = "default_cdn_base")]
    pub cdn_base: String,

    /// Gateways for content-addressed identifiers, in priority order.
    #[serde(default = "default_gateways")]
    pub gateways: Vec<String>,

    /// Serve content from this directory instead of over HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_content_timeout")]
    pub timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            cdn_base: default_cdn_base(),
            gateways: default_gateways(),
            local_dir: None,
            timeout_secs: default_content_timeout(),
        }
    }
}

/// Feedback and progression timings.
///
/// The feedback overlay and the advance delay run on separate timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    /// How long the correct/incorrect overlay stays visible.
    #[serde(default = "default_feedback_ms")]
    pub feedback_ms: u64,

    /// Delay between a correct verdict and the next exercise.
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,

    /// How long a mismatched matching pair stays marked before reverting.
    #[serde(default = "default_mismatch_revert_ms")]
    pub mismatch_revert_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            feedback_ms: default_feedback_ms(),
            advance_delay_ms: default_advance_delay_ms(),
            mismatch_revert_ms: default_mismatch_revert_ms(),
        }
    }
}

impl Timings {
    /// Feedback overlay duration.
    #[must_use]
    pub const fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    /// Delay before advancing after a correct verdict.
    #[must_use]
    pub const fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    /// Delay before a mismatched pair reverts.
    #[must_use]
    pub const fn mismatch_revert(&self) -> Duration {
        Duration::from_millis(self.mismatch_revert_ms)
    }
}

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Give up on a capture after this many seconds.
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,

    /// Recognition language when neither the exercise nor the session
    /// names one.
    #[serde(default = "default_voice_language")]
    pub fallback_language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_speech_timeout(),
            fallback_language: default_voice_language(),
        }
    }
}

impl SpeechConfig {
    /// Capture timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
