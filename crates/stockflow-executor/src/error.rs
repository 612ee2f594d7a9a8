//! Error types for sequence execution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a single step failed
///
/// Every variant is caught at the step boundary and recorded in the
/// [`ExecutionResult`](crate::ExecutionResult); none escapes `execute()`.
#[derive(Error, Debug)]
pub enum StepError {
    /// The sequence names a tool the registry does not know
    #[error("tool '{tool}' not found in registry")]
    ToolNotFound { tool: String },

    /// The tool returned an error
    #[error("tool '{tool}' failed: {source}")]
    ToolInvocation {
        tool: String,
        #[source]
        source: stockflow_core::Error,
    },

    /// The tool returned normally but its payload reports a failure
    #[error("tool '{tool}' reported failure: {message}")]
    SemanticFailure {
        tool: String,
        message: String,
        payload: Value,
    },

    /// The parameter mapping could not be applied to the dependency output
    #[error("cannot resolve parameters for '{step}': {reason}")]
    MalformedDependency { step: String, reason: String },
}

impl StepError {
    /// Classification of this error
    pub fn kind(&self) -> StepErrorKind {
        match self {
            StepError::ToolNotFound { .. } => StepErrorKind::ToolNotFound,
            StepError::ToolInvocation { .. } => StepErrorKind::ToolInvocation,
            StepError::SemanticFailure { .. } => StepErrorKind::SemanticFailure,
            StepError::MalformedDependency { .. } => StepErrorKind::MalformedDependency,
        }
    }

    /// Whether the underlying tool error is a transient network condition
    pub fn is_transient(&self) -> bool {
        match self {
            StepError::ToolInvocation { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn malformed(step: &str, reason: impl Into<String>) -> Self {
        StepError::MalformedDependency {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

/// Serializable tag for [`StepError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    ToolNotFound,
    ToolInvocation,
    SemanticFailure,
    MalformedDependency,
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepErrorKind::ToolNotFound => "ToolNotFoundError",
            StepErrorKind::ToolInvocation => "ToolInvocationError",
            StepErrorKind::SemanticFailure => "SemanticToolFailure",
            StepErrorKind::MalformedDependency => "MalformedDependencyError",
        };
        f.write_str(s)
    }
}

/// Invalid executor configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A transient-error pattern is not a valid regular expression
    #[error("invalid transient pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Any other invalid setting
    #[error("configuration error: {0}")]
    Invalid(String),
}
