//! Configuration management for Parley
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and environment variables. Secrets (identity token,
//! speech API key) are only ever read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Opening line used when the turn service cannot open the conversation
pub const DEFAULT_OPENING_LINE: &str =
    "Bonjour! Comment allez-vous aujourd'hui? Je suis votre tuteur de français.";

/// Assistant message appended in place of a failed reply
pub const DEFAULT_APOLOGY_LINE: &str = "Sorry, I encountered an error. Please try again.";

/// User-visible error text for a failed turn
pub const DEFAULT_TURN_ERROR: &str = "Failed to send message. Please try again.";

/// Parley configuration
#[derive(Debug)]
pub struct Config {
    /// Remote service configuration
    pub api: ApiConfig,

    /// Dialogue behaviour
    pub dialogue: DialogueConfig,

    /// Speech capture and playback
    pub voice: VoiceConfig,

    /// Signed-in identity (from `PARLEY_USER_ID` / `PARLEY_TOKEN`)
    pub credentials: Credentials,

    /// API key for the speech endpoints (`OPENAI_API_KEY`)
    pub speech_api_key: Option<SecretString>,
}

/// Remote turn and persistence service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL shared by the turn and persistence endpoints
    pub base_url: String,

    /// Upper bound on a single conversational turn
    pub turn_timeout_secs: u64,

    /// HTTP request timeout for persistence calls
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            turn_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Turn timeout as a `Duration`
    #[must_use]
    pub const fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Dialogue behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// BCP 47 language tag used for recognition and synthesis
    pub language: String,

    /// Fallback opening line
    pub opening_line: String,

    /// Fallback reply for a failed turn
    pub apology_line: String,

    /// Error slot text for a failed turn
    pub turn_error: String,

    /// Number of messages that makes a complete practice session
    pub exchange_goal: usize,

    /// Submit recognized speech immediately instead of leaving it in the input buffer
    pub auto_submit_speech: bool,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            language: "fr-FR".to_string(),
            opening_line: DEFAULT_OPENING_LINE.to_string(),
            apology_line: DEFAULT_APOLOGY_LINE.to_string(),
            turn_error: DEFAULT_TURN_ERROR.to_string(),
            exchange_goal: 10,
            auto_submit_speech: true,
        }
    }
}

/// A synthesis voice offered by the speech endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceEntry {
    /// Voice identifier sent to the TTS endpoint
    pub id: String,

    /// Language tag the voice is tuned for
    pub language: String,
}

/// Speech capture and playback configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Enable microphone and speaker
    pub enabled: bool,

    /// Whisper-compatible transcription endpoint
    pub stt_url: String,

    /// STT model
    pub stt_model: String,

    /// OpenAI-compatible speech endpoint
    pub tts_url: String,

    /// TTS model
    pub tts_model: String,

    /// Voice used when no catalog entry matches the language
    pub default_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Voice catalog
    pub voices: Vec<VoiceEntry>,

    /// How long an utterance waits for an empty voice catalog to populate
    pub catalog_wait_ms: u64,

    /// Give up listening after this long without any speech
    pub listen_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stt_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_url: "https://api.openai.com/v1/audio/speech".to_string(),
            tts_model: "tts-1".to_string(),
            default_voice: "alloy".to_string(),
            tts_speed: 1.0,
            voices: vec![
                VoiceEntry {
                    id: "nova".to_string(),
                    language: "fr-FR".to_string(),
                },
                VoiceEntry {
                    id: "alloy".to_string(),
                    language: "en-US".to_string(),
                },
            ],
            catalog_wait_ms: 2000,
            listen_timeout_secs: 10,
        }
    }
}

impl VoiceConfig {
    /// Catalog wait as a `Duration`
    #[must_use]
    pub const fn catalog_wait(&self) -> Duration {
        Duration::from_millis(self.catalog_wait_ms)
    }

    /// Listen timeout as a `Duration`
    #[must_use]
    pub const fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }
}

/// Identity supplied through the environment
#[derive(Debug, Default)]
pub struct Credentials {
    /// Signed-in user id
    pub user_id: Option<String>,

    /// Bearer token for the remote services
    pub token: Option<SecretString>,
}

/// On-disk layout of the TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: ApiConfig,
    dialogue: DialogueConfig,
    voice: VoiceConfig,
}

/// Return the default config file location
///
/// Uses `~/.config/parley/config.toml` on Linux
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "parley")
        .map(|d| d.config_dir().join("config.toml"))
}

impl Config {
    /// Load configuration from the file system and process environment
    ///
    /// An explicit `path` must exist; the default location is optional.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    Error::Config(format!("failed to read {}: {e}", p.display()))
                })?;
                tracing::info!(path = %p.display(), "loaded config file");
                Some(content)
            }
            None => default_config_path()
                .filter(|p| p.exists())
                .and_then(|p| match std::fs::read_to_string(&p) {
                    Ok(content) => {
                        tracing::info!(path = %p.display(), "loaded config file");
                        Some(content)
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %p.display(),
                            error = %e,
                            "failed to read config file, using defaults"
                        );
                        None
                    }
                }),
        };

        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build configuration from TOML text and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is invalid or an override cannot be parsed
    pub fn from_sources<F>(toml_text: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match toml_text {
            Some(text) => toml::from_str(text)?,
            None => FileConfig::default(),
        };

        let mut config = Self {
            api: file.api,
            dialogue: file.dialogue,
            voice: file.voice,
            credentials: Credentials {
                user_id: env("PARLEY_USER_ID").filter(|s| !s.is_empty()),
                token: env("PARLEY_TOKEN")
                    .filter(|s| !s.is_empty())
                    .map(SecretString::from),
            },
            speech_api_key: env("OPENAI_API_KEY")
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
        };

        if let Some(url) = env("PARLEY_API_URL") {
            config.api.base_url = url;
        }
        if let Some(secs) = env("PARLEY_TURN_TIMEOUT_SECS") {
            config.api.turn_timeout_secs = secs.parse().map_err(|e| {
                Error::Config(format!("invalid PARLEY_TURN_TIMEOUT_SECS '{secs}': {e}"))
            })?;
        }
        if let Some(language) = env("PARLEY_LANGUAGE") {
            config.dialogue.language = language;
        }
        if let Some(model) = env("PARLEY_STT_MODEL") {
            config.voice.stt_model = model;
        }
        if let Some(model) = env("PARLEY_TTS_MODEL") {
            config.voice.tts_model = model;
        }
        if let Some(voice) = env("PARLEY_TTS_VOICE") {
            config.voice.default_voice = voice;
        }
        if env("PARLEY_DISABLE_VOICE").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            tracing::info!("voice explicitly disabled via PARLEY_DISABLE_VOICE");
            config.voice.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)?;

        if self.api.turn_timeout_secs == 0 {
            return Err(Error::Config("api.turn_timeout_secs must be positive".to_string()));
        }
        if self.dialogue.exchange_goal == 0 {
            return Err(Error::Config("dialogue.exchange_goal must be positive".to_string()));
        }
        if self.dialogue.opening_line.trim().is_empty()
            || self.dialogue.apology_line.trim().is_empty()
        {
            return Err(Error::Config(
                "dialogue.opening_line and dialogue.apology_line must not be empty".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed {} outside 0.25..=4.0",
                self.voice.tts_speed
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::from_sources(None, env_from(&[])).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8000/api");
        assert_eq!(config.api.turn_timeout(), Duration::from_secs(30));
        assert_eq!(config.dialogue.language, "fr-FR");
        assert_eq!(config.dialogue.opening_line, DEFAULT_OPENING_LINE);
        assert_eq!(config.dialogue.exchange_goal, 10);
        assert!(config.voice.enabled);
        assert!(config.credentials.user_id.is_none());
        assert!(config.credentials.token.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let toml = r#"
            [api]
            base_url = "https://tutor.example.com/api"
            turn_timeout_secs = 5

            [dialogue]
            language = "es-ES"
            exchange_goal = 6

            [voice]
            enabled = false
            voices = [{ id = "coral", language = "es-ES" }]
        "#;

        let config = Config::from_sources(Some(toml), env_from(&[])).unwrap();

        assert_eq!(config.api.base_url, "https://tutor.example.com/api");
        assert_eq!(config.api.turn_timeout_secs, 5);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.dialogue.language, "es-ES");
        assert_eq!(config.dialogue.exchange_goal, 6);
        assert_eq!(config.dialogue.apology_line, DEFAULT_APOLOGY_LINE);
        assert!(!config.voice.enabled);
        assert_eq!(config.voice.voices.len(), 1);
        assert_eq!(config.voice.voices[0].id, "coral");
    }

    #[test]
    fn env_overrides_file() {
        let toml = r#"
            [dialogue]
            language = "es-ES"
        "#;
        let env = env_from(&[
            ("PARLEY_LANGUAGE", "de-DE"),
            ("PARLEY_API_URL", "http://127.0.0.1:9000/api"),
            ("PARLEY_USER_ID", "user-42"),
            ("PARLEY_TOKEN", "secret-token"),
            ("PARLEY_DISABLE_VOICE", "true"),
        ]);

        let config = Config::from_sources(Some(toml), env).unwrap();

        assert_eq!(config.dialogue.language, "de-DE");
        assert_eq!(config.api.base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.credentials.user_id.as_deref(), Some("user-42"));
        assert_eq!(
            config.credentials.token.as_ref().map(|t| t.expose_secret()),
            Some("secret-token")
        );
        assert!(!config.voice.enabled);
    }

    #[test]
    fn empty_credentials_are_ignored() {
        let env = env_from(&[("PARLEY_USER_ID", ""), ("PARLEY_TOKEN", "")]);
        let config = Config::from_sources(None, env).unwrap();

        assert!(config.credentials.user_id.is_none());
        assert!(config.credentials.token.is_none());
    }

    #[test]
    fn rejects_invalid_timeout_override() {
        let env = env_from(&[("PARLEY_TURN_TIMEOUT_SECS", "soon")]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let toml = "[api]\nturn_timeout_secs = 0\n";
        assert!(Config::from_sources(Some(toml), env_from(&[])).is_err());
    }

    #[test]
    fn rejects_invalid_base_url() {
        let env = env_from(&[("PARLEY_API_URL", "not a url")]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::from_sources(Some("[api\nbase_url ="), env_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dialogue]\nexchange_goal = 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.dialogue.exchange_goal, 4);
    }

    #[test]
    fn load_fails_for_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
