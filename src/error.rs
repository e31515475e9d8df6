use crate::types::HttpMessage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("malformed header line {line:?}")]
    MalformedHeader { line: String },

    #[error("payload is not decodable: {reason}")]
    DecodeFailure { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraceError {
    pub fn decode(reason: impl Into<String>) -> Self {
        TraceError::DecodeFailure {
            reason: reason.into(),
        }
    }

    /// Only I/O failures end a session; everything else is a per-line failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraceError::Io(_))
    }
}

/// Result of decomposing one HTTP payload
pub type ParseOutcome = Result<HttpMessage, TraceError>;
