//! Configuration for the murmur assistant

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Top-level assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrase that activates the assistant (e.g. "hey murmur")
    pub wake_phrase: String,

    /// Dialogue policy knobs (timeouts, thresholds)
    pub orchestrator: OrchestratorConfig,

    /// Voice provider configuration
    pub voice: VoiceConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,

    /// Root directory the filesystem and spreadsheet agents may touch
    pub workspace_dir: PathBuf,

    /// Data directory (config overrides, caches)
    pub data_dir: PathBuf,
}

/// Dialogue policy knobs
///
/// Tuning values that ship with sensible defaults; `orchestrator.toml`
/// in the data dir overrides any of them.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Sub-threshold audio duration that seals an utterance (ms)
    pub silence_timeout_ms: u64,

    /// Minimum confidence for a final recognition result to dispatch
    pub confidence_threshold: f32,

    /// Budget for a single recognition call (ms)
    pub recognition_timeout_ms: u64,

    /// Budget for a single agent execution (ms)
    pub agent_timeout_ms: u64,

    /// Budget for a single synthesis call (ms)
    pub synthesis_timeout_ms: u64,

    /// Minimum speech an utterance must contain before recognition (ms)
    pub min_speech_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 800,
            confidence_threshold: 0.6,
            recognition_timeout_ms: 10_000,
            agent_timeout_ms: 30_000,
            synthesis_timeout_ms: 10_000,
            min_speech_ms: 300,
        }
    }
}

impl OrchestratorConfig {
    /// Silence timeout as a [`Duration`]
    #[must_use]
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    /// Recognition budget as a [`Duration`]
    #[must_use]
    pub const fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    /// Agent budget as a [`Duration`]
    #[must_use]
    pub const fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Synthesis budget as a [`Duration`]
    #[must_use]
    pub const fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }

    /// Minimum speech duration as a [`Duration`]
    #[must_use]
    pub const fn min_speech(&self) -> Duration {
        Duration::from_millis(self.min_speech_ms)
    }
}

/// Voice provider selection and models
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT provider: "whisper" or "deepgram"
    pub stt_provider: String,

    /// STT model identifier (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS provider: "openai" or "elevenlabs"
    pub tts_provider: String,

    /// TTS model identifier
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier
    pub tts_speed: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_provider: "whisper".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_provider: "openai".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,

    /// `Brave` Search API key
    pub brave: Option<String>,

    /// `Serper` (Google) Search API key
    pub serper: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub fn load() -> Result<Self> {
        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok(),
            deepgram: std::env::var("DEEPGRAM_API_KEY").ok(),
            elevenlabs: std::env::var("ELEVENLABS_API_KEY").ok(),
            brave: std::env::var("BRAVE_API_KEY").ok(),
            serper: std::env::var("SERPER_API_KEY").ok(),
        };

        let voice = VoiceConfig {
            stt_provider: std::env::var("MURMUR_STT_PROVIDER")
                .unwrap_or_else(|_| "whisper".to_string()),
            stt_model: std::env::var("MURMUR_STT_MODEL")
                .unwrap_or_else(|_| "whisper-1".to_string()),
            tts_provider: std::env::var("MURMUR_TTS_PROVIDER")
                .unwrap_or_else(|_| "openai".to_string()),
            tts_model: std::env::var("MURMUR_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            tts_voice: std::env::var("MURMUR_TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            tts_speed: std::env::var("MURMUR_TTS_SPEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        };

        let wake_phrase = std::env::var("MURMUR_WAKE_PHRASE")
            .unwrap_or_else(|_| "hey murmur".to_string())
            .to_lowercase()
            .trim()
            .to_string();

        if wake_phrase.is_empty() {
            return Err(Error::Config("MURMUR_WAKE_PHRASE must not be empty".to_string()));
        }

        // Data directory (~/.local/share/murmur on Linux)
        let data_dir = directories::ProjectDirs::from("dev", "murmur", "murmur")
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf());
        std::fs::create_dir_all(&data_dir)?;

        let workspace_dir = std::env::var("MURMUR_WORKSPACE").map_or_else(
            |_| {
                directories::UserDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.home_dir().join("murmur"))
            },
            PathBuf::from,
        );

        let orchestrator = Self::load_orchestrator_config(&data_dir);

        Ok(Self {
            wake_phrase,
            orchestrator,
            voice,
            api_keys,
            workspace_dir,
            data_dir,
        })
    }

    /// Load policy knobs from `orchestrator.toml` in the data dir, or defaults
    fn load_orchestrator_config(data_dir: &std::path::Path) -> OrchestratorConfig {
        let path = data_dir.join("orchestrator.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "loaded orchestrator config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse orchestrator config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to read orchestrator config"
                    );
                }
            }
        }

        OrchestratorConfig::default()
    }
}
