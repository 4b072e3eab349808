use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice capability unavailable")]
    Unavailable,

    #[error("already listening")]
    AlreadyListening,

    #[error("no-speech")]
    NoSpeech,

    #[error("aborted")]
    Aborted,

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file error: {0}")]
    File(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
