//! Stage graph - runs the four analysis stages for a subject
//!
//! Financial, industry and valuation run first, either one after another
//! (each seeing the reports written before it) or concurrently. Integration
//! runs last with all three reports in its context.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use stockflow_core::Context;
use stockflow_core::context::keys;
use stockflow_executor::{Sequence, SequentialToolExecutor};
use stockflow_tools::ToolRegistry;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::report::{ReportGenerator, SummaryReportGenerator};
use crate::result::{AnalysisReport, StageReport};
use crate::stage::AnalysisStage;

/// Runs the analysis stages for one or many subjects
pub struct StageGraph {
    executor: SequentialToolExecutor,
    generator: Arc<dyn ReportGenerator>,
    fallback: SummaryReportGenerator,
    sequences: HashMap<AnalysisStage, Sequence>,
    config: AnalysisConfig,
}

impl StageGraph {
    pub fn builder() -> StageGraphBuilder {
        StageGraphBuilder::new()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The sequence run for `stage`
    pub fn sequence(&self, stage: AnalysisStage) -> &Sequence {
        self.sequences
            .get(&stage)
            .unwrap_or_else(|| stage.sequence())
    }

    /// Run every stage for one subject
    pub async fn run(&self, subject_id: &str, subject_name: &str, context: Context) -> AnalysisReport {
        let mut report = AnalysisReport::new(subject_id, subject_name);
        info!(
            "Starting analysis of {} ({}), run {}",
            subject_name, subject_id, report.run_id
        );

        let mut context = context;
        if let Some(date) = &self.config.analysis_date {
            if !context.contains_key(keys::ANALYSIS_DATE) {
                context.insert(keys::ANALYSIS_DATE, Value::String(date.clone()));
            }
        }

        let research = if self.config.parallel_stages {
            let (financial, industry, valuation) = tokio::join!(
                self.run_stage(AnalysisStage::Financial, subject_id, subject_name, &context),
                self.run_stage(AnalysisStage::Industry, subject_id, subject_name, &context),
                self.run_stage(AnalysisStage::Valuation, subject_id, subject_name, &context),
            );
            vec![financial, industry, valuation]
        } else {
            let mut stages = Vec::with_capacity(AnalysisStage::RESEARCH.len());
            let mut running = context.clone();
            for stage in AnalysisStage::RESEARCH {
                let outcome = self.run_stage(stage, subject_id, subject_name, &running).await;
                running.insert(stage.report_key(), Value::String(outcome.0.report.clone()));
                stages.push(outcome);
            }
            stages
        };

        let mut integration_context = context;
        for (stage_report, _) in &research {
            integration_context.insert(
                stage_report.stage.report_key(),
                Value::String(stage_report.report.clone()),
            );
        }

        for (stage_report, warning) in research {
            report.stages.push(stage_report);
            if let Some(warning) = warning {
                report.add_warning(warning);
            }
        }

        let (integration, warning) = self
            .run_stage(AnalysisStage::Integration, subject_id, subject_name, &integration_context)
            .await;
        report.stages.push(integration);
        if let Some(warning) = warning {
            report.add_warning(warning);
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Finished analysis of {} ({}): success rate {:.0}%, {} warning(s)",
            subject_name,
            subject_id,
            report.success_rate() * 100.0,
            report.warnings.len()
        );
        report
    }

    /// Run independent analyses for several subjects
    ///
    /// At most `max_concurrent_subjects` run at once. Reports come back in
    /// input order.
    pub async fn run_batch<I, S>(&self, subjects: I, context: &Context) -> Vec<AnalysisReport>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let subjects: Vec<(String, String)> = subjects
            .into_iter()
            .map(|(id, name)| (id.into(), name.into()))
            .collect();
        info!(
            "Batch analysis of {} subject(s), up to {} at a time",
            subjects.len(),
            self.config.max_concurrent_subjects
        );

        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_subjects));
        let runs = subjects.iter().map(|(id, name)| {
            let limiter = Arc::clone(&limiter);
            async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = limiter.acquire().await.ok();
                self.run(id, name, context.clone()).await
            }
        });

        futures::future::join_all(runs).await
    }

    async fn run_stage(
        &self,
        stage: AnalysisStage,
        subject_id: &str,
        subject_name: &str,
        context: &Context,
    ) -> (StageReport, Option<String>) {
        let execution = self
            .executor
            .execute(self.sequence(stage), subject_id, subject_name, Some(context))
            .await;

        let (report, degraded, warning) =
            match self.generator.generate(stage, &execution, context).await {
                Ok(text) => (text, false, None),
                Err(e) => {
                    warn!("{} report for {} fell back to summary: {}", stage, subject_id, e);
                    let warning = format!("{stage} report generation failed: {e}");
                    (self.fallback.render(stage, &execution), true, Some(warning))
                }
            };

        (
            StageReport {
                stage,
                execution,
                report,
                degraded,
            },
            warning,
        )
    }
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("executor", &self.executor)
            .field("sequences", &self.sequences.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for StageGraph
pub struct StageGraphBuilder {
    registry: Option<Arc<ToolRegistry>>,
    generator: Option<Arc<dyn ReportGenerator>>,
    sequences: HashMap<AnalysisStage, Sequence>,
    config: AnalysisConfig,
}

impl StageGraphBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            generator: None,
            sequences: HashMap::new(),
            config: AnalysisConfig::default(),
        }
    }

    /// Set the tool registry every stage runs against
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the report generator
    pub fn generator(mut self, generator: Arc<dyn ReportGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the predefined sequence for `stage`
    pub fn sequence(mut self, stage: AnalysisStage, sequence: Sequence) -> Self {
        self.sequences.insert(stage, sequence);
        self
    }

    /// Set the full configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Run research stages concurrently
    pub fn parallel_stages(mut self, parallel: bool) -> Self {
        self.config.parallel_stages = parallel;
        self
    }

    /// Build the graph, validating every stage sequence
    pub fn build(self) -> Result<StageGraph> {
        let registry = self
            .registry
            .ok_or_else(|| AnalysisError::Config("tool registry not set".to_string()))?;
        self.config.validate()?;

        let mut sequences = self.sequences;
        for stage in AnalysisStage::ALL {
            let sequence = sequences.entry(stage).or_insert_with(|| stage.sequence().clone());
            if self.config.strict_tools {
                sequence.validate_against(&registry)?;
            } else {
                sequence.validate()?;
            }
        }

        let executor = SequentialToolExecutor::builder()
            .registry(registry)
            .config(self.config.executor.clone())
            .build()?;

        Ok(StageGraph {
            executor,
            generator: self
                .generator
                .unwrap_or_else(|| Arc::new(SummaryReportGenerator::new())),
            fallback: SummaryReportGenerator::new(),
            sequences,
            config: self.config,
        })
    }
}

impl Default for StageGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MockReportGenerator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use stockflow_executor::ExecutionStep;
    use stockflow_tools::FnTool;
    use tokio::sync::Mutex;

    type Calls = Arc<Mutex<HashMap<String, Value>>>;

    /// A registry with every predefined tool, recording the last arguments each received
    fn registry(calls: &Calls) -> ToolRegistry {
        stockflow_utils::init_tracing();

        let mut registry = ToolRegistry::new();
        for stage in AnalysisStage::ALL {
            for name in stage.sequence().tool_names() {
                let calls = Arc::clone(calls);
                let name = name.to_string();
                registry.register(Arc::new(FnTool::new(name.clone(), move |params| {
                    let calls = Arc::clone(&calls);
                    let name = name.clone();
                    async move {
                        calls.lock().await.insert(name.clone(), params);
                        Ok(json!({"tool": name}))
                    }
                })));
            }
        }
        registry
    }

    fn labelled_generator() -> MockReportGenerator {
        let mut generator = MockReportGenerator::new();
        generator
            .expect_generate()
            .returning(|stage, _, _| Ok(format!("{stage} report")));
        generator
    }

    #[tokio::test]
    async fn test_sequential_stages_see_earlier_reports() {
        let calls = Calls::default();
        let graph = StageGraph::builder()
            .registry(Arc::new(registry(&calls)))
            .generator(Arc::new(labelled_generator()))
            .build()
            .unwrap();

        let report = graph
            .run("600519", "Kweichow Moutai", Context::new().with_analysis_date("2024-06-30"))
            .await;

        assert!(report.is_complete());
        assert!(report.warnings.is_empty());
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.final_report(), Some("integration report"));
        assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);

        let calls = calls.lock().await;
        let industry = &calls["get_industry_data"];
        assert_eq!(industry["financial_report"], json!("financial report"));
        assert!(industry.get("valuation_report").is_none());

        let integration = &calls["collect_analysis_results"];
        assert_eq!(integration["financial_report"], json!("financial report"));
        assert_eq!(integration["industry_report"], json!("industry report"));
        assert_eq!(integration["valuation_report"], json!("valuation report"));
        assert_eq!(integration["analysis_date"], json!("2024-06-30"));
        assert_eq!(integration["subject_id"], json!("600519"));
    }

    #[tokio::test]
    async fn test_parallel_stages_are_independent() {
        let calls = Calls::default();
        let graph = StageGraph::builder()
            .registry(Arc::new(registry(&calls)))
            .generator(Arc::new(labelled_generator()))
            .parallel_stages(true)
            .build()
            .unwrap();

        let report = graph.run("000858", "Wuliangye", Context::new()).await;

        assert!(report.is_complete());
        let calls = calls.lock().await;
        assert!(calls["get_industry_data"].get("financial_report").is_none());
        assert!(calls["get_market_data"].get("industry_report").is_none());
        assert_eq!(
            calls["collect_analysis_results"]["valuation_report"],
            json!("valuation report")
        );
    }

    #[tokio::test]
    async fn test_report_failure_degrades_to_summary() {
        let calls = Calls::default();
        let mut generator = MockReportGenerator::new();
        generator
            .expect_generate()
            .times(4)
            .returning(|stage, _, _| match stage {
                AnalysisStage::Industry => Err(AnalysisError::ReportFailed {
                    stage,
                    reason: "model offline".to_string(),
                }),
                other => Ok(format!("{other} report")),
            });

        let graph = StageGraph::builder()
            .registry(Arc::new(registry(&calls)))
            .generator(Arc::new(generator))
            .build()
            .unwrap();

        let report = graph.run("600519", "Kweichow Moutai", Context::new()).await;

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("model offline"));
        let industry = report.stage(AnalysisStage::Industry).unwrap();
        assert!(industry.degraded);
        assert!(industry.report.starts_with("# Industry analysis: Kweichow Moutai (600519)"));

        let calls = calls.lock().await;
        let fallback = calls["collect_analysis_results"]["industry_report"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert_eq!(fallback, industry.report);
    }

    #[tokio::test]
    async fn test_failed_stage_still_reports() {
        let calls = Calls::default();
        let mut registry = registry(&calls);
        registry.register(Arc::new(FnTool::new("get_market_data", |_| async {
            Err(stockflow_core::Error::ProcessingFailed("exchange closed".into()))
        })));

        let graph = StageGraph::builder()
            .registry(Arc::new(registry))
            .build()
            .unwrap();

        let report = graph.run("600519", "Kweichow Moutai", Context::new()).await;

        assert!(!report.is_complete());
        let valuation = report.stage(AnalysisStage::Valuation).unwrap();
        assert!(!valuation.success());
        assert_eq!(valuation.execution.steps().len(), 1);
        assert!(valuation.report.contains("exchange closed"));
        assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);
        assert!(report.stage(AnalysisStage::Integration).unwrap().success());
    }

    #[test]
    fn test_build_validates_sequences() {
        let broken = Sequence::builder("financial_analysis")
            .step(ExecutionStep::new("a", "").depends_on("nowhere"))
            .build();
        let err = StageGraph::builder()
            .registry(Arc::new(ToolRegistry::new()))
            .sequence(AnalysisStage::Financial, broken)
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSequence(_)));

        let err = StageGraph::builder().build().unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn test_strict_build_requires_tools() {
        let config = AnalysisConfig {
            strict_tools: true,
            ..AnalysisConfig::default()
        };
        let err = StageGraph::builder()
            .registry(Arc::new(ToolRegistry::new()))
            .config(config.clone())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("is not registered"));

        let calls = Calls::default();
        assert!(
            StageGraph::builder()
                .registry(Arc::new(registry(&calls)))
                .config(config)
                .build()
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_sequence_override() {
        let calls = Calls::default();
        let custom = Sequence::builder("quick_financials")
            .step(ExecutionStep::new("get_financial_data", "").with_arg("years", json!(1)))
            .build();
        let graph = StageGraph::builder()
            .registry(Arc::new(registry(&calls)))
            .sequence(AnalysisStage::Financial, custom)
            .build()
            .unwrap();

        let report = graph.run("600519", "Kweichow Moutai", Context::new()).await;

        let financial = report.stage(AnalysisStage::Financial).unwrap();
        assert_eq!(financial.execution.sequence_name(), "quick_financials");
        assert_eq!(calls.lock().await["get_financial_data"]["years"], json!(1));
        assert!(!calls.lock().await.contains_key("calculate_financial_ratios"));
    }

    #[tokio::test]
    async fn test_run_batch_bounds_concurrency() {
        let calls = Calls::default();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut registry = registry(&calls);
        {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            registry.register(Arc::new(FnTool::new("get_financial_data", move |params| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!({"subject": params["subject_id"]}))
                }
            })));
        }

        let graph = StageGraph::builder()
            .registry(Arc::new(registry))
            .config(AnalysisConfig::builder().max_concurrent_subjects(2).build().unwrap())
            .build()
            .unwrap();

        let subjects = [
            ("600519", "Kweichow Moutai"),
            ("000858", "Wuliangye"),
            ("601318", "Ping An"),
            ("000333", "Midea"),
        ];
        let reports = graph.run_batch(subjects, &Context::new()).await;

        assert_eq!(reports.len(), 4);
        let ids: Vec<_> = reports.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["600519", "000858", "601318", "000333"]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(reports.iter().all(AnalysisReport::is_complete));
    }
}
