//! Error types reported by tools

use thiserror::Error;

/// Result type alias for stockflow-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type a tool returns when it cannot produce a result
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Arguments did not match what the tool expects
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Network failure talking to an upstream data source
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream call did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Upstream answered but had nothing for the subject
    #[error("Data not available for {subject}: {reason}")]
    DataUnavailable { subject: String, reason: String },

    /// Tool processing failed
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure is a transient network condition
    ///
    /// Only the variant is inspected here; message-based heuristics live in
    /// the executor's continuation policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}
