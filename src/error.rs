use thiserror::Error;

use frame_protocol::ProtocolError;

/// Analysis pipeline errors.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("configuration invalid: {0}")]
    Config(String),

    #[error("configuration file unreadable: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("configuration file malformed: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("frame sampling failed: {0}")]
    Sample(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error("inference worker unavailable")]
    WorkerUnavailable,

    #[error("no Tokio runtime available")]
    NoRuntime,

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, AnalysisError>;
