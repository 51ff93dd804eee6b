use thiserror::Error;

/// Errors decoding or validating protocol payloads.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("probability {0} is outside 0-100")]
    ProbabilityOutOfRange(f64),

    #[error("successful response carried no result")]
    MissingResult,

    #[error("batch response is empty")]
    EmptyBatch,

    #[error("batch header {found:?} is missing the time or deepfake_probability column")]
    BatchHeader { found: String },

    #[error("batch line {line}: {reason}")]
    MalformedBatchLine { line: usize, reason: String },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ProtocolError>;
