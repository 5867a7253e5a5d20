//! TOML configuration file loading
//!
//! Supports `~/.config/nimbus/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NimbusConfigFile {
    /// Spoken name of the assistant
    #[serde(default)]
    pub assistant_name: Option<String>,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speaker-verification and admin-session configuration
    #[serde(default)]
    pub security: SecurityFileConfig,

    /// Chat/classifier model configuration
    #[serde(default)]
    pub model: ModelFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Speaker-embedding service URL
    pub embedding_url: Option<String>,
}

/// Security configuration
#[derive(Debug, Default, Deserialize)]
pub struct SecurityFileConfig {
    /// Cosine-similarity threshold for Owner classification
    pub verify_threshold: Option<f32>,

    /// Admin session timeout in minutes
    pub session_timeout_minutes: Option<u64>,
}

/// Chat/classifier model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// OpenAI-compatible base URL for chat and intent classification
    pub chat_url: Option<String>,

    /// Chat model identifier
    pub chat_model: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NimbusConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
pub fn load_config_file() -> NimbusConfigFile {
    let Some(base) = directories::BaseDirs::new() else {
        return NimbusConfigFile::default();
    };

    let path = base.config_dir().join("nimbus").join("config.toml");
    if !path.exists() {
        return NimbusConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NimbusConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NimbusConfigFile::default()
        }
    }
}
