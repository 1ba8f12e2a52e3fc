//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech engine absent on this device (terminal for that subsystem only)
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Speech recognition failed mid-listen
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Turn service request failed (network, HTTP status, timeout)
    #[error("turn service error: {0}")]
    TurnService(String),

    /// Turn service answered without a usable reply
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Session persistence failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No signed-in identity or an expired credential
    #[error("not signed in")]
    Unauthenticated,

    /// Operation not allowed in the controller's current state
    #[error("busy: {0}")]
    Busy(String),

    /// The dialogue session has already ended
    #[error("session has ended")]
    SessionEnded,

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

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

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

