//! Analysis result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockflow_executor::ExecutionResult;
use uuid::Uuid;

use crate::stage::AnalysisStage;

/// One stage's trace and the report written from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: AnalysisStage,
    pub execution: ExecutionResult,
    pub report: String,
    /// The report came from the fallback generator
    pub degraded: bool,
}

impl StageReport {
    pub fn success(&self) -> bool {
        self.execution.success()
    }
}

/// Everything a full analysis of one subject produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub subject_id: String,
    pub subject_name: String,
    pub stages: Vec<StageReport>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisReport {
    pub fn new(subject_id: impl Into<String>, subject_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            subject_name: subject_name.into(),
            stages: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn stage(&self, stage: AnalysisStage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// The integration stage's report
    pub fn final_report(&self) -> Option<&str> {
        self.stage(AnalysisStage::Integration)
            .map(|s| s.report.as_str())
    }

    /// Every stage ran and every sequence succeeded
    pub fn is_complete(&self) -> bool {
        AnalysisStage::ALL
            .iter()
            .all(|stage| self.stage(*stage).is_some_and(StageReport::success))
    }

    /// Fraction of stages whose sequence succeeded
    pub fn success_rate(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        let succeeded = self.stages.iter().filter(|s| s.success()).count();
        succeeded as f64 / self.stages.len() as f64
    }

    pub fn summary(&self) -> String {
        let status = if self.is_complete() { "✅" } else { "⚠️" };
        let mut out = format!(
            "{} {} ({}) - {}/{} stages succeeded ({})\n",
            status,
            self.subject_name,
            self.subject_id,
            self.stages.iter().filter(|s| s.success()).count(),
            self.stages.len(),
            self.started_at.format("%Y-%m-%d %H:%M UTC")
        );
        for stage in &self.stages {
            let mark = if stage.success() { "✅" } else { "❌" };
            let note = if stage.degraded { " (fallback report)" } else { "" };
            out.push_str(&format!("  {mark} {}{note}\n", stage.stage));
        }
        for warning in &self.warnings {
            out.push_str(&format!("  ⚠️ {warning}\n"));
        }
        out
    }
}
