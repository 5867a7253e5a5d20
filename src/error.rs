//! Error types for the Nimbus assistant

use thiserror::Error;

/// Result type alias for Nimbus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Nimbus assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speaker embedding extraction error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Voice enrollment error
    #[error("enrollment error: {0}")]
    Enrollment(String),

    /// Capture worker process error
    #[error("capture error: {0}")]
    Capture(String),

    /// Intent classification error
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Chat model error
    #[error("chat error: {0}")]
    Chat(String),

    /// Plugin execution error
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Security/audit error
    #[error("security error: {0}")]
    Security(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
