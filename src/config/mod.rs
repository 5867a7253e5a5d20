//! Configuration management for the Nimbus assistant

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Default cosine-similarity threshold for Owner classification
pub const DEFAULT_VERIFY_THRESHOLD: f32 = 0.75;

/// Default admin session timeout
const DEFAULT_SESSION_TIMEOUT_MINUTES: u64 = 5;

/// Nimbus assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Spoken name of the assistant
    pub assistant_name: String,

    /// Path to data directory (profile, database, audit log)
    pub data_dir: PathBuf,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Security configuration
    pub security: SecurityConfig,

    /// Chat/classifier model configuration
    pub model: ModelConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: String,

    /// STT model identifier
    pub stt_model: String,

    /// TTS model identifier
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Speaker-embedding service URL
    pub embedding_url: String,
}

/// Security configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Admin password. `None` disables admin authentication entirely —
    /// there is no hardcoded fallback.
    pub admin_password: Option<String>,

    /// Cosine-similarity threshold for Owner classification
    pub verify_threshold: f32,

    /// Admin session sliding-expiry window
    pub session_timeout: Duration,
}

/// Chat/classifier model configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL for chat and intent classification
    pub chat_url: String,

    /// Chat model identifier
    pub chat_model: String,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT, TTS, chat, classification)
    pub openai: Option<String>,

    /// Deepgram API key (optional STT)
    pub deepgram: Option<String>,
}

impl Config {
    /// Load configuration with priority: env > TOML file > defaults
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let data_dir = std::env::var("NIMBUS_DATA_DIR").map_or_else(
            |_| {
                directories::BaseDirs::new().map_or_else(
                    || PathBuf::from(".nimbus"),
                    |d| d.data_dir().join("nimbus"),
                )
            },
            PathBuf::from,
        );
        std::fs::create_dir_all(&data_dir)?;

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai),
            deepgram: std::env::var("DEEPGRAM_API_KEY")
                .ok()
                .or(fc.api_keys.deepgram),
        };

        let voice = VoiceConfig {
            stt_provider: std::env::var("NIMBUS_STT_PROVIDER")
                .ok()
                .or(fc.voice.stt_provider)
                .unwrap_or_else(|| "whisper".to_string()),
            stt_model: std::env::var("NIMBUS_STT_MODEL")
                .ok()
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: std::env::var("NIMBUS_TTS_MODEL")
                .ok()
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: std::env::var("NIMBUS_TTS_VOICE")
                .ok()
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: std::env::var("NIMBUS_TTS_SPEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.voice.tts_speed)
                .unwrap_or(1.0),
            embedding_url: std::env::var("NIMBUS_EMBED_URL")
                .ok()
                .or(fc.voice.embedding_url)
                .unwrap_or_else(|| "http://localhost:7865/embed".to_string()),
        };

        let security = SecurityConfig {
            admin_password: std::env::var("NIMBUS_ADMIN_PASSWORD").ok(),
            verify_threshold: std::env::var("NIMBUS_VERIFY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.security.verify_threshold)
                .unwrap_or(DEFAULT_VERIFY_THRESHOLD),
            session_timeout: Duration::from_secs(
                60 * fc
                    .security
                    .session_timeout_minutes
                    .unwrap_or(DEFAULT_SESSION_TIMEOUT_MINUTES),
            ),
        };

        let model = ModelConfig {
            chat_url: std::env::var("NIMBUS_CHAT_URL")
                .ok()
                .or(fc.model.chat_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            chat_model: std::env::var("NIMBUS_CHAT_MODEL")
                .ok()
                .or(fc.model.chat_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        };

        let assistant_name = std::env::var("NIMBUS_NAME")
            .ok()
            .or(fc.assistant_name)
            .unwrap_or_else(|| "Nimbus".to_string());

        Ok(Self {
            assistant_name,
            data_dir,
            voice,
            security,
            model,
            api_keys,
        })
    }

    /// Path of the persisted owner voice profile
    #[must_use]
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("owner_voice.bin")
    }

    /// Path of the append-only security audit log
    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("security_audit.log")
    }

    /// Path of the long-term memory database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("nimbus.db")
    }
}
