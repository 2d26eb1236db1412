//! Error types for the recap gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the recap gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Recording audio fetch from the telephony provider failed
    #[error("recording download failed: {status} {reason}")]
    Download { status: u16, reason: String },

    /// API quota, billing, or rate-limit exhaustion; never retried
    #[error("API quota exhausted: {0}")]
    Quota(String),

    /// Terminal transcription failure after retries
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Object upload or metadata record write/update failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Speech synthesis or its upload failed
    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    /// Call lookup or outbound call placement failed
    #[error("telephony error: {0}")]
    Telephony(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error signals exhausted account limits.
    ///
    /// Quota errors must never be retried; the account owner has to
    /// address billing or rate limits first.
    #[must_use]
    pub const fn is_quota(&self) -> bool {
        matches!(self, Self::Quota(_))
    }
}
