//! Error types for multi-stage analysis

use stockflow_executor::{ConfigError, ValidationError};
use thiserror::Error;

use crate::stage::AnalysisStage;

/// Analysis specific errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A stage sequence failed static validation
    #[error("Invalid sequence: {0}")]
    InvalidSequence(#[from] ValidationError),

    /// Executor configuration rejected
    #[error("Executor configuration error: {0}")]
    Executor(#[from] ConfigError),

    /// Analysis configuration rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// The report generator could not produce a report
    #[error("Report generation failed for {stage} stage: {reason}")]
    ReportFailed {
        stage: AnalysisStage,
        reason: String,
    },

    /// A tool failed outside of a sequence run
    #[error("Tool error: {0}")]
    Tool(#[from] stockflow_core::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Convert AnalysisError to stockflow_core::Error
impl From<AnalysisError> for stockflow_core::Error {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Tool(inner) => inner,
            other => stockflow_core::Error::ProcessingFailed(other.to_string()),
        }
    }
}

/// Convert anyhow::Error to AnalysisError
impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Other(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_failed_display() {
        let err = AnalysisError::ReportFailed {
            stage: AnalysisStage::Valuation,
            reason: "model offline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Report generation failed for valuation stage: model offline"
        );
    }

    #[test]
    fn test_into_core_error() {
        let core: stockflow_core::Error =
            AnalysisError::Tool(stockflow_core::Error::Timeout("30s".into())).into();
        assert!(core.is_transient());

        let core: stockflow_core::Error = AnalysisError::Config("bad".into()).into();
        assert_eq!(core.to_string(), "Processing failed: Configuration error: bad");
    }

    #[test]
    fn test_from_anyhow() {
        let err: AnalysisError = anyhow::anyhow!("root cause").context("loading").into();
        assert_eq!(err.to_string(), "loading: root cause");
    }
}
