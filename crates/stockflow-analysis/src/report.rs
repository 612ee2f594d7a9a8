//! Stage report generation
//!
//! A [`ReportGenerator`] turns one stage's execution trace into prose. The
//! production implementation is a language model reached through a named
//! tool; [`SummaryReportGenerator`] is the deterministic fallback.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use stockflow_core::Context;
use stockflow_executor::ExecutionResult;
use stockflow_tools::ToolRegistry;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::stage::AnalysisStage;

/// Produces a report for a finished stage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Write the report for `stage` from its trace and the context it ran with
    async fn generate(
        &self,
        stage: AnalysisStage,
        execution: &ExecutionResult,
        context: &Context,
    ) -> Result<String>;
}

/// Builds a markdown report straight from the execution trace
#[derive(Debug, Clone)]
pub struct SummaryReportGenerator {
    preview_chars: usize,
}

impl Default for SummaryReportGenerator {
    fn default() -> Self {
        Self { preview_chars: 300 }
    }
}

impl SummaryReportGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit each tool output excerpt to `chars` characters
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Render the report synchronously
    pub fn render(&self, stage: AnalysisStage, execution: &ExecutionResult) -> String {
        let mut report = format!(
            "# {} analysis: {} ({})\n\n",
            capitalize(stage.name()),
            execution.subject_name(),
            execution.subject_id()
        );
        report.push_str(&execution.summary());

        if !execution.tool_results().is_empty() {
            report.push_str("\n## Tool outputs\n\n");
            for (tool, value) in execution.tool_results() {
                report.push_str(&format!("- **{tool}**: {}\n", self.excerpt(value)));
            }
        }

        report
    }

    fn excerpt(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if text.chars().count() <= self.preview_chars {
            text
        } else {
            let mut cut: String = text.chars().take(self.preview_chars).collect();
            cut.push_str("...");
            cut
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl ReportGenerator for SummaryReportGenerator {
    async fn generate(
        &self,
        stage: AnalysisStage,
        execution: &ExecutionResult,
        _context: &Context,
    ) -> Result<String> {
        Ok(self.render(stage, execution))
    }
}

/// Delegates report writing to a registered tool
///
/// The tool receives `stage`, `subject_id`, `subject_name`, `success`,
/// `errors`, `tool_results` and the stage context, and returns either the
/// report text or an object with a `report` field.
pub struct ToolReportGenerator {
    registry: Arc<ToolRegistry>,
    tool_name: String,
}

impl ToolReportGenerator {
    pub fn new(registry: Arc<ToolRegistry>, tool_name: impl Into<String>) -> Self {
        Self {
            registry,
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    fn request(stage: AnalysisStage, execution: &ExecutionResult, context: &Context) -> Value {
        let tool_results: Map<String, Value> = execution
            .tool_results()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        json!({
            "stage": stage,
            "subject_id": execution.subject_id(),
            "subject_name": execution.subject_name(),
            "success": execution.success(),
            "errors": execution.errors(),
            "tool_results": tool_results,
            "context": context,
        })
    }
}

impl std::fmt::Debug for ToolReportGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolReportGenerator")
            .field("tool_name", &self.tool_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReportGenerator for ToolReportGenerator {
    async fn generate(
        &self,
        stage: AnalysisStage,
        execution: &ExecutionResult,
        context: &Context,
    ) -> Result<String> {
        let tool = self
            .registry
            .get(&self.tool_name)
            .ok_or_else(|| AnalysisError::ReportFailed {
                stage,
                reason: format!("report tool '{}' not registered", self.tool_name),
            })?;

        debug!("Generating {} report with tool {}", stage, self.tool_name);
        let output = tool
            .execute(Self::request(stage, execution, context))
            .await
            .map_err(|e| AnalysisError::ReportFailed {
                stage,
                reason: e.to_string(),
            })?;

        match output {
            Value::String(text) => Ok(text),
            Value::Object(map) => match map.get("report") {
                Some(Value::String(text)) => Ok(text.clone()),
                _ => Err(AnalysisError::ReportFailed {
                    stage,
                    reason: "report tool returned an object without a 'report' field".to_string(),
                }),
            },
            other => Err(AnalysisError::ReportFailed {
                stage,
                reason: format!("report tool returned unexpected output: {other}"),
            }),
        }
    }
}
