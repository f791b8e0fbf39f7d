//! TOML configuration file loading
//!
//! Supports `~/.config/jarvis/config.toml` as a persistent source of tunables.
//! All fields are optional; the file is a partial overlay on top of defaults.
//! Secrets are only read from the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JarvisConfigFile {
    /// Hub settings
    #[serde(default)]
    pub hub: HubFileConfig,

    /// Wake word settings
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Microphone and listening settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Speech-to-text settings
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Intent LLM settings
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Action dispatch settings
    #[serde(default)]
    pub dispatch: DispatchFileConfig,

    /// Text-to-speech settings
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// Home-automation hub configuration
#[derive(Debug, Default, Deserialize)]
pub struct HubFileConfig {
    /// Base URL (e.g. "http://homeassistant.local:8123")
    pub url: Option<String>,

    /// Health check timeout in seconds
    pub health_timeout_secs: Option<u64>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Keyword (e.g. "jarvis")
    pub keyword: Option<String>,

    /// Detection sensitivity in `[0, 1]`
    pub sensitivity: Option<f32>,
}

/// Microphone and listening configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Substring of the input device name
    pub mic_name: Option<String>,

    /// Device index used when no name matches
    pub fallback_index: Option<usize>,

    /// Seconds to wait for speech onset
    pub listen_timeout_secs: Option<u64>,

    /// Maximum phrase duration in seconds
    pub phrase_limit_secs: Option<u64>,

    /// Pause before reopening the microphone, in milliseconds
    pub settle_ms: Option<u64>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider ("whisper" or "deepgram")
    pub provider: Option<String>,

    /// Model identifier
    pub model: Option<String>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider ("gemini" or "openai")
    pub provider: Option<String>,

    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,
}

/// Dispatch configuration
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    /// Pause between successive actions, in milliseconds
    pub action_pause_ms: Option<u64>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Speech command (e.g. "say", "espeak-ng")
    pub command: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `JarvisConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> JarvisConfigFile {
    config_file_path().map_or_else(JarvisConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Missing or unreadable files yield defaults with a warning.
#[must_use]
pub fn load_from(path: &Path) -> JarvisConfigFile {
    if !path.exists() {
        return JarvisConfigFile::default();
    }

    match read_file(path) {
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
            JarvisConfigFile::default()
        }
    }
}

fn read_file(path: &Path) -> Result<JarvisConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/jarvis/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvis").join("config.toml"))
}
