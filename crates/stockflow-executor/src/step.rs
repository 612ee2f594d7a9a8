//! Declarative step and sequence definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::param::{ParamParseError, ParamSource};

/// What to do when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Halt the sequence
    Stop,
    /// Record the failure and run the next step
    Continue,
    /// Let the executor's continuation policy decide
    #[default]
    Inherit,
}

impl OnFailure {
    fn is_inherit(&self) -> bool {
        matches!(self, OnFailure::Inherit)
    }
}

/// One declared tool invocation within a sequence
///
/// Steps are built once as static configuration and read by every run.
///
/// # Example
///
/// ```
/// use stockflow_executor::{ExecutionStep, ParamSource};
///
/// let step = ExecutionStep::new("calculate_financial_ratios", "Compute financial ratios")
///     .depends_on("get_financial_data")
///     .map_param("financial_data", ParamSource::full_result());
///
/// assert_eq!(step.dependency(), Some("get_financial_data"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    tool_name: String,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    required_args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependency: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    param_mapping: BTreeMap<String, ParamSource>,
    #[serde(default, skip_serializing_if = "OnFailure::is_inherit")]
    on_failure: OnFailure,
}

impl ExecutionStep {
    /// Create a step invoking `tool_name`
    pub fn new(tool_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            description: description.into(),
            required_args: Map::new(),
            dependency: None,
            param_mapping: BTreeMap::new(),
            on_failure: OnFailure::Inherit,
        }
    }

    /// Add a static argument merged into every invocation
    pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.required_args.insert(name.into(), value);
        self
    }

    /// Replace all static arguments
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.required_args = args;
        self
    }

    /// Declare the prior step this one consumes
    pub fn depends_on(mut self, tool_name: impl Into<String>) -> Self {
        self.dependency = Some(tool_name.into());
        self
    }

    /// Map a target argument to a source
    pub fn map_param(mut self, target: impl Into<String>, source: ParamSource) -> Self {
        self.param_mapping.insert(target.into(), source);
        self
    }

    /// Map a target argument using the compact string form
    pub fn map_param_str(
        self,
        target: impl Into<String>,
        spec: &str,
    ) -> Result<Self, ParamParseError> {
        let source = ParamSource::parse(spec)?;
        Ok(self.map_param(target, source))
    }

    /// Set the failure policy
    pub fn on_failure(mut self, policy: OnFailure) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn required_args(&self) -> &Map<String, Value> {
        &self.required_args
    }

    pub fn dependency(&self) -> Option<&str> {
        self.dependency.as_deref()
    }

    pub fn param_mapping(&self) -> &BTreeMap<String, ParamSource> {
        &self.param_mapping
    }

    pub fn failure_policy(&self) -> OnFailure {
        self.on_failure
    }
}

/// An ordered, immutable list of steps describing one analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    name: String,
    steps: Vec<ExecutionStep>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<ExecutionStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn builder(name: impl Into<String>) -> SequenceBuilder {
        SequenceBuilder::new(name)
    }

    /// Parse a sequence authored as JSON
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionStep> {
        self.steps.iter()
    }

    /// Index of the first step invoking `tool_name`
    pub fn position(&self, tool_name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.tool_name == tool_name)
    }

    /// Tool names in execution order
    pub fn tool_names(&self) -> Vec<&str> {
        self.steps.iter().map(ExecutionStep::tool_name).collect()
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a ExecutionStep;
    type IntoIter = std::slice::Iter<'a, ExecutionStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Builder for [`Sequence`]
#[derive(Debug)]
pub struct SequenceBuilder {
    name: String,
    steps: Vec<ExecutionStep>,
}

impl SequenceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: ExecutionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Build the sequence
    ///
    /// No validation happens here; see [`Sequence::validate`].
    pub fn build(self) -> Sequence {
        Sequence {
            name: self.name,
            steps: self.steps,
        }
    }
}
