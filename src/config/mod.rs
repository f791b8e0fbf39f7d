//! Configuration management for the Jarvis relay
//!
//! Values come from the environment (optionally seeded from a `.env` file),
//! then the TOML overlay in [`file`], then built-in defaults.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::catalog::DeviceCatalog;
use crate::intent::LlmProvider;
use crate::voice::SttProvider;
use crate::{Error, Result};

use file::JarvisConfigFile;

/// Default microphone name substring
pub const DEFAULT_MIC_NAME: &str = "MacBook Pro Microphone";

/// Default wake keyword
pub const DEFAULT_WAKE_WORD: &str = "jarvis";

/// Default wake sensitivity
pub const DEFAULT_SENSITIVITY: f32 = 0.7;

/// Default LLM model
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";

/// Relay configuration, built once at startup and read-only afterwards
#[derive(Debug, Clone)]
pub struct Config {
    /// Home-automation hub
    pub hub: HubConfig,

    /// Wake word engine
    pub wake: WakeConfig,

    /// Microphone and listening
    pub audio: AudioConfig,

    /// Speech-to-text service
    pub stt: SttConfig,

    /// Intent LLM
    pub llm: LlmConfig,

    /// Action dispatch
    pub dispatch: DispatchConfig,

    /// Speech command override (auto-detected when `None`)
    pub tts_command: Option<String>,

    /// Friendly name to entity mapping
    pub devices: DeviceCatalog,
}

/// Hub connection settings
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Base URL without trailing slash
    pub url: String,

    /// Long-lived bearer token
    pub token: SecretString,

    /// Health check timeout
    pub health_timeout: Duration,
}

/// Wake word engine settings
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Engine access key
    pub access_key: SecretString,

    /// Keyword to listen for
    pub keyword: String,

    /// Detection sensitivity in `[0, 1]`
    pub sensitivity: f32,
}

/// Microphone and listening settings
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Substring matched against input device names
    pub mic_name: String,

    /// Device index used when no name matches
    pub fallback_index: usize,

    /// How long to wait for speech onset
    pub listen_timeout: Duration,

    /// Maximum phrase duration
    pub phrase_limit: Duration,

    /// Pause before reopening the microphone after a wake
    pub settle: Duration,
}

/// Speech-to-text settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Backend
    pub provider: SttProvider,

    /// API key
    pub api_key: SecretString,

    /// Model identifier
    pub model: String,
}

/// Intent LLM settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Backend
    pub provider: LlmProvider,

    /// API key
    pub api_key: SecretString,

    /// Model identifier
    pub model: String,
}

/// Dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause between successive actions
    pub action_pause: Duration,
}

impl Config {
    /// Load configuration from `.env`, the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or the device catalog is malformed
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to read .env"),
        }

        let fc = file::load_config_file();
        Self::from_sources(|name| std::env::var(name).ok(), fc)
    }

    /// Build configuration from a variable lookup and a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or the device catalog is malformed
    pub fn from_sources<F>(lookup: F, fc: JarvisConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let hub_url = var("HA_URL")
            .or(fc.hub.url)
            .ok_or_else(|| missing("HA_URL"))?;
        let hub_url = normalize_base_url(&hub_url)?;
        let hub_token = var("HA_TOKEN").ok_or_else(|| missing("HA_TOKEN"))?;
        let stt_key = var("STT_API_KEY").ok_or_else(|| missing("STT_API_KEY"))?;
        let llm_key = var("LLM_API_KEY")
            .or_else(|| var("GOOGLE_API_KEY"))
            .ok_or_else(|| missing("LLM_API_KEY"))?;

        let devices = DeviceCatalog::from_json(
            &var("DEVICES_JSON").unwrap_or_else(|| "{}".to_string()),
        )?;

        let hub = HubConfig {
            url: hub_url,
            token: SecretString::from(hub_token),
            health_timeout: Duration::from_secs(
                parse_var(&var, "JARVIS_HEALTH_TIMEOUT_SECS")
                    .or(fc.hub.health_timeout_secs)
                    .unwrap_or(2),
            ),
        };

        // The spotter verifies segments through the STT service, so it shares that key
        let wake = WakeConfig {
            access_key: SecretString::from(stt_key.clone()),
            keyword: var("JARVIS_WAKE_WORD")
                .or(fc.wake.keyword)
                .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string()),
            sensitivity: parse_var(&var, "JARVIS_WAKE_SENSITIVITY")
                .or(fc.wake.sensitivity)
                .unwrap_or(DEFAULT_SENSITIVITY),
        };

        let audio = AudioConfig {
            mic_name: var("MIC_NAME")
                .or(fc.audio.mic_name)
                .unwrap_or_else(|| DEFAULT_MIC_NAME.to_string()),
            fallback_index: parse_var(&var, "JARVIS_MIC_FALLBACK_INDEX")
                .or(fc.audio.fallback_index)
                .unwrap_or(1),
            listen_timeout: Duration::from_secs(
                parse_var(&var, "JARVIS_LISTEN_TIMEOUT_SECS")
                    .or(fc.audio.listen_timeout_secs)
                    .unwrap_or(3),
            ),
            phrase_limit: Duration::from_secs(
                parse_var(&var, "JARVIS_PHRASE_LIMIT_SECS")
                    .or(fc.audio.phrase_limit_secs)
                    .unwrap_or(10),
            ),
            settle: Duration::from_millis(
                parse_var(&var, "JARVIS_MIC_SETTLE_MS")
                    .or(fc.audio.settle_ms)
                    .unwrap_or(500),
            ),
        };

        let stt_provider: SttProvider = var("JARVIS_STT_PROVIDER")
            .or(fc.stt.provider)
            .map_or(Ok(SttProvider::Whisper), |s| s.parse())?;
        let stt = SttConfig {
            provider: stt_provider,
            api_key: SecretString::from(stt_key),
            model: var("JARVIS_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
        };

        let llm = LlmConfig {
            provider: var("JARVIS_LLM_PROVIDER")
                .or(fc.llm.provider)
                .map_or(Ok(LlmProvider::Gemini), |s| s.parse())?,
            api_key: SecretString::from(llm_key),
            model: var("JARVIS_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        };

        let dispatch = DispatchConfig {
            action_pause: Duration::from_millis(
                parse_var(&var, "JARVIS_ACTION_PAUSE_MS")
                    .or(fc.dispatch.action_pause_ms)
                    .unwrap_or(500),
            ),
        };

        let tts_command = var("JARVIS_TTS_COMMAND").or(fc.tts.command);

        Ok(Self {
            hub,
            wake,
            audio,
            stt,
            llm,
            dispatch,
            tts_command,
            devices,
        })
    }
}

fn missing(name: &str) -> Error {
    Error::Config(format!("{name} is not set"))
}

/// Parse an optional variable, warning on unparseable values
fn parse_var<T, F>(var: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(name, value = %raw, "ignoring invalid value");
            None
        }
    }
}

/// Validate the hub URL and strip any trailing slash
fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| Error::Config(format!("HA_URL is not a valid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "HA_URL must use http or https, got {}",
            parsed.scheme()
        )));
    }

    Ok(raw.trim().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("HA_URL", "http://homeassistant.local:8123/"),
            ("HA_TOKEN", "ha-token"),
            ("STT_API_KEY", "stt-key"),
            ("LLM_API_KEY", "llm-key"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config> {
        Config::from_sources(
            |name| vars.get(name).map(ToString::to_string),
            JarvisConfigFile::default(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.hub.url, "http://homeassistant.local:8123");
        assert_eq!(config.hub.token.expose_secret(), "ha-token");
        assert_eq!(config.hub.health_timeout, Duration::from_secs(2));
        assert_eq!(config.wake.keyword, "jarvis");
        assert!((config.wake.sensitivity - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.audio.mic_name, DEFAULT_MIC_NAME);
        assert_eq!(config.audio.listen_timeout, Duration::from_secs(3));
        assert_eq!(config.audio.phrase_limit, Duration::from_secs(10));
        assert_eq!(config.dispatch.action_pause, Duration::from_millis(500));
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.stt.provider, SttProvider::Whisper);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_each_required_value_is_fatal() {
        for key in ["HA_URL", "HA_TOKEN", "STT_API_KEY", "LLM_API_KEY"] {
            let mut vars = required();
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{key}: {err}");
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut vars = required();
        vars.insert("HA_TOKEN", "   ");
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn test_google_key_alias() {
        let mut vars = required();
        vars.remove("LLM_API_KEY");
        vars.insert("GOOGLE_API_KEY", "gemini-key");
        let config = load(&vars).unwrap();
        assert_eq!(config.llm.api_key.expose_secret(), "gemini-key");
    }

    #[test]
    fn test_malformed_devices_is_fatal() {
        let mut vars = required();
        vars.insert("DEVICES_JSON", "{\"lamp\": ");
        assert!(matches!(load(&vars), Err(Error::Catalog(_))));
    }

    #[test]
    fn test_invalid_hub_url() {
        let mut vars = required();
        vars.insert("HA_URL", "homeassistant.local");
        assert!(matches!(load(&vars), Err(Error::Config(_))));

        vars.insert("HA_URL", "ftp://homeassistant.local");
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut vars = required();
        vars.insert("JARVIS_LISTEN_TIMEOUT_SECS", "2");

        let mut fc = JarvisConfigFile::default();
        fc.audio.listen_timeout_secs = Some(5);
        fc.hub.health_timeout_secs = Some(60);

        let config =
            Config::from_sources(|name| vars.get(name).map(ToString::to_string), fc).unwrap();
        assert_eq!(config.audio.listen_timeout, Duration::from_secs(2));
        assert_eq!(config.hub.health_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_number_falls_back_to_default() {
        let mut vars = required();
        vars.insert("JARVIS_ACTION_PAUSE_MS", "soon");
        let config = load(&vars).unwrap();
        assert_eq!(config.dispatch.action_pause, Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut vars = required();
        vars.insert("JARVIS_LLM_PROVIDER", "parrot");
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&required()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("ha-token"));
        assert!(!debug.contains("llm-key"));
    }
}
