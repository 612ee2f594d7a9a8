//! Continue-or-halt decisions for failed steps

use regex::Regex;
use std::collections::HashSet;

use crate::config::{ExecutorConfig, compile_pattern};
use crate::error::{ConfigError, StepError};
use crate::step::{ExecutionStep, OnFailure};

/// Outcome of a continuation decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Run the next step
    Proceed(ToleranceReason),
    /// Stop the sequence
    Halt,
}

impl Continuation {
    pub fn is_halt(&self) -> bool {
        matches!(self, Continuation::Halt)
    }
}

/// Why a failure was tolerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceReason {
    /// The step declared `on_failure: continue`
    Declared,
    /// The tool is on the non-critical allow-list
    NonCritical,
    /// The error looks like a transient network condition
    Transient,
}

impl std::fmt::Display for ToleranceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToleranceReason::Declared => "declared continue",
            ToleranceReason::NonCritical => "non-critical tool",
            ToleranceReason::Transient => "transient error",
        };
        f.write_str(s)
    }
}

/// Decides whether a failed step halts its sequence
///
/// A step's explicit [`OnFailure::Stop`] or [`OnFailure::Continue`] always
/// wins. Steps left at [`OnFailure::Inherit`] are tolerated when the tool is
/// non-critical, or when a tool error is transient.
#[derive(Debug, Clone)]
pub struct ContinuationPolicy {
    non_critical: HashSet<String>,
    transient: Vec<Regex>,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        let config = ExecutorConfig::default();
        Self {
            non_critical: config.non_critical_tools.into_iter().collect(),
            transient: config
                .transient_patterns
                .iter()
                .filter_map(|p| compile_pattern(p).ok())
                .collect(),
        }
    }
}

impl ContinuationPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, ConfigError> {
        let transient = config
            .transient_patterns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            non_critical: config.non_critical_tools.iter().cloned().collect(),
            transient,
        })
    }

    /// A policy with an empty allow-list and no text patterns
    pub fn strict() -> Self {
        Self {
            non_critical: HashSet::new(),
            transient: Vec::new(),
        }
    }

    pub fn is_non_critical(&self, tool_name: &str) -> bool {
        self.non_critical.contains(tool_name)
    }

    /// Whether `text` matches any transient pattern
    pub fn matches_transient(&self, text: &str) -> bool {
        self.transient.iter().any(|re| re.is_match(text))
    }

    /// Decide what happens after `step` failed with `error`
    pub fn decide(&self, step: &ExecutionStep, error: &StepError) -> Continuation {
        match step.failure_policy() {
            OnFailure::Stop => Continuation::Halt,
            OnFailure::Continue => Continuation::Proceed(ToleranceReason::Declared),
            OnFailure::Inherit if self.is_non_critical(step.tool_name()) => {
                Continuation::Proceed(ToleranceReason::NonCritical)
            }
            OnFailure::Inherit if self.is_transient(error) => {
                Continuation::Proceed(ToleranceReason::Transient)
            }
            OnFailure::Inherit => Continuation::Halt,
        }
    }

    // Missing tools and broken mappings are configuration faults and never
    // count as transient, whatever their message says.
    fn is_transient(&self, error: &StepError) -> bool {
        match error {
            StepError::ToolInvocation { source, .. } => {
                source.is_transient() || self.matches_transient(&source.to_string())
            }
            StepError::SemanticFailure { message, .. } => self.matches_transient(message),
            StepError::ToolNotFound { .. } | StepError::MalformedDependency { .. } => false,
        }
    }
}
