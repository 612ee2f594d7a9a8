//! Execution trace types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StepError, StepErrorKind};
use crate::resolve::ToolResults;

/// What a step produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepPayload {
    /// The tool's raw return value
    Result { value: Value },
    /// The failure, stringified
    Error { kind: StepErrorKind, message: String },
}

/// Record of one attempted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based position in the sequence
    pub step_number: usize,
    pub tool_name: String,
    pub description: String,
    pub success: bool,
    pub payload: StepPayload,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            StepPayload::Result { value } => Some(value),
            StepPayload::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            StepPayload::Result { .. } => None,
            StepPayload::Error { message, .. } => Some(message),
        }
    }
}

/// Everything one sequence run produced
///
/// `steps` holds exactly one entry per attempted step, in order. Only steps
/// that completed, or failed with a tolerated self-reported payload, leave
/// an entry in `tool_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    run_id: Uuid,
    sequence_name: String,
    subject_id: String,
    subject_name: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    steps: Vec<StepOutcome>,
    tool_results: ToolResults,
    errors: Vec<String>,
    success: bool,
}

impl ExecutionResult {
    pub(crate) fn start(
        sequence_name: impl Into<String>,
        subject_id: impl Into<String>,
        subject_name: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sequence_name: sequence_name.into(),
            subject_id: subject_id.into(),
            subject_name: subject_name.into(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            tool_results: ToolResults::new(),
            errors: Vec::new(),
            success: true,
        }
    }

    pub(crate) fn record_success(
        &mut self,
        tool_name: &str,
        description: &str,
        value: Value,
        executed_at: DateTime<Utc>,
        duration_ms: u64,
    ) {
        self.tool_results.insert(tool_name.to_string(), value.clone());
        self.steps.push(StepOutcome {
            step_number: self.steps.len() + 1,
            tool_name: tool_name.to_string(),
            description: description.to_string(),
            success: true,
            payload: StepPayload::Result { value },
            executed_at,
            duration_ms,
        });
    }

    /// Record a failure; `placeholder` is stored in `tool_results` when given
    pub(crate) fn record_failure(
        &mut self,
        tool_name: &str,
        description: &str,
        error: &StepError,
        placeholder: Option<Value>,
        executed_at: DateTime<Utc>,
        duration_ms: u64,
    ) {
        let step_number = self.steps.len() + 1;
        let message = error.to_string();

        if let Some(value) = placeholder {
            self.tool_results.insert(tool_name.to_string(), value);
        }
        self.errors
            .push(format!("Step {step_number} failed ({tool_name}): {message}"));
        self.steps.push(StepOutcome {
            step_number,
            tool_name: tool_name.to_string(),
            description: description.to_string(),
            success: false,
            payload: StepPayload::Error {
                kind: error.kind(),
                message,
            },
            executed_at,
            duration_ms,
        });
        self.success = false;
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    pub fn tool_results(&self) -> &ToolResults {
        &self.tool_results
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// True iff no step failed
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn tool_result(&self, tool_name: &str) -> Option<&Value> {
        self.tool_results.get(tool_name)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.success)
    }

    pub fn succeeded_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.success)
    }

    /// Whether the run stopped before attempting all `sequence_len` steps
    pub fn was_halted(&self, sequence_len: usize) -> bool {
        self.steps.len() < sequence_len
    }

    /// Wall-clock duration of the run, once finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Human readable pass/fail listing
    pub fn summary(&self) -> String {
        let status = if self.success { "✅" } else { "❌" };
        let mut out = format!(
            "{} {} for {} ({}) - {}/{} steps succeeded\n",
            status,
            self.sequence_name,
            self.subject_name,
            self.subject_id,
            self.succeeded_steps().count(),
            self.steps.len()
        );

        for step in &self.steps {
            let mark = if step.success { "✅" } else { "❌" };
            out.push_str(&format!(
                "  {} {}. {} - {}\n",
                mark, step.step_number, step.tool_name, step.description
            ));
        }

        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for error in &self.errors {
                out.push_str(&format!("  - {error}\n"));
            }
        }

        out
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
