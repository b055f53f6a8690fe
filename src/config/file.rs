//! TOML configuration file loading
//!
//! Supports `~/.config/os1/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct Os1ConfigFile {
    /// Recognition locale (e.g. "en-US")
    #[serde(default)]
    pub locale: Option<String>,

    /// Chat collaborator configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Capture timing
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Playback timing and text handling
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Persona names
    #[serde(default)]
    pub personas: PersonasFileConfig,
}

/// Chat-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// OpenAI-compatible base URL
    pub url: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// System prompt sent ahead of the history
    pub system_prompt: Option<String>,
    /// Reply length cap
    pub max_tokens: Option<u32>,
}

/// TTS configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "elevenlabs" or "openai"
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub setup_voice: Option<String>,
    pub female_voice: Option<String>,
    pub male_voice: Option<String>,
}

/// STT configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Wait after stopping recognition for trailing results
    pub settle_ms: Option<u64>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Pause after cancelling a playing utterance
    pub grace_ms: Option<u64>,
    /// Replace stripped stage directions with a space instead of deleting them
    pub keep_pauses: Option<bool>,
}

/// Persona names
#[derive(Debug, Default, Deserialize)]
pub struct PersonasFileConfig {
    pub female_name: Option<String>,
    pub male_name: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `Os1ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> Os1ConfigFile {
    config_file_path().map_or_else(Os1ConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_from(path: &Path) -> Os1ConfigFile {
    if !path.exists() {
        return Os1ConfigFile::default();
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            Os1ConfigFile::default()
        }
    }
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the file cannot be read and [`crate::Error::Toml`] if
/// it is not valid configuration
pub fn read_config_file(path: &Path) -> Result<Os1ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/os1/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "os1").map(|d| d.config_dir().join("config.toml"))
}
