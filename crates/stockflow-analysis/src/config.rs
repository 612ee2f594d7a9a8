//! Configuration for multi-stage analysis

use serde::{Deserialize, Serialize};
use stockflow_executor::ExecutorConfig;

use crate::error::{AnalysisError, Result};

/// Configuration for a [`StageGraph`](crate::StageGraph)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Settings for the executor running every stage
    pub executor: ExecutorConfig,

    /// Run the financial, industry and valuation stages concurrently.
    /// Later stages then do not see earlier reports.
    pub parallel_stages: bool,

    /// Upper bound on subjects analysed at once by `run_batch`
    pub max_concurrent_subjects: usize,

    /// Analysis date (YYYY-MM-DD) seeded into every stage's context
    pub analysis_date: Option<String>,

    /// Validate stage sequences against the tool registry at build time
    pub strict_tools: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            parallel_stages: false,
            max_concurrent_subjects: 4,
            analysis_date: None,
            strict_tools: false,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Overlay `STOCKFLOW_*` environment variables
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(parallel) = lookup("STOCKFLOW_PARALLEL_STAGES") {
            self.parallel_stages = is_truthy(&parallel);
        }
        if let Some(max) = lookup("STOCKFLOW_MAX_CONCURRENT_SUBJECTS")
            .and_then(|raw| raw.trim().parse().ok())
        {
            self.max_concurrent_subjects = max;
        }
        if let Some(date) = lookup("STOCKFLOW_ANALYSIS_DATE") {
            self.analysis_date = Some(date.trim().to_string());
        }
        self.executor = self.executor.with_lookup(&lookup);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_subjects == 0 {
            return Err(AnalysisError::Config(
                "max_concurrent_subjects must be greater than 0".to_string(),
            ));
        }

        if let Some(date) = &self.analysis_date {
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                AnalysisError::Config(format!("analysis_date '{date}' is not YYYY-MM-DD: {e}"))
            })?;
        }

        self.executor.validate()?;
        Ok(())
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Builder for AnalysisConfig
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    executor: Option<ExecutorConfig>,
    parallel_stages: Option<bool>,
    max_concurrent_subjects: Option<usize>,
    analysis_date: Option<String>,
    strict_tools: Option<bool>,
}

impl AnalysisConfigBuilder {
    /// Set the executor configuration
    pub fn executor(mut self, config: ExecutorConfig) -> Self {
        self.executor = Some(config);
        self
    }

    /// Run research stages concurrently
    pub fn parallel_stages(mut self, parallel: bool) -> Self {
        self.parallel_stages = Some(parallel);
        self
    }

    /// Set the batch concurrency limit
    pub fn max_concurrent_subjects(mut self, max: usize) -> Self {
        self.max_concurrent_subjects = Some(max);
        self
    }

    /// Set the analysis date
    pub fn analysis_date(mut self, date: impl Into<String>) -> Self {
        self.analysis_date = Some(date.into());
        self
    }

    /// Check sequences against the registry when building a graph
    pub fn strict_tools(mut self, strict: bool) -> Self {
        self.strict_tools = Some(strict);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AnalysisConfig> {
        let defaults = AnalysisConfig::default();

        let config = AnalysisConfig {
            executor: self.executor.unwrap_or(defaults.executor),
            parallel_stages: self.parallel_stages.unwrap_or(defaults.parallel_stages),
            max_concurrent_subjects: self
                .max_concurrent_subjects
                .unwrap_or(defaults.max_concurrent_subjects),
            analysis_date: self.analysis_date.or(defaults.analysis_date),
            strict_tools: self.strict_tools.unwrap_or(defaults.strict_tools),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert!(!config.parallel_stages);
        assert_eq!(config.max_concurrent_subjects, 4);
        assert!(config.analysis_date.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AnalysisConfig::builder()
            .parallel_stages(true)
            .max_concurrent_subjects(2)
            .analysis_date("2024-12-31")
            .strict_tools(true)
            .build()
            .unwrap();

        assert!(config.parallel_stages);
        assert_eq!(config.max_concurrent_subjects, 2);
        assert_eq!(config.analysis_date.as_deref(), Some("2024-12-31"));
        assert!(config.strict_tools);
    }

    #[test]
    fn test_validation() {
        assert!(AnalysisConfig::builder().max_concurrent_subjects(0).build().is_err());
        assert!(AnalysisConfig::builder().analysis_date("31/12/2024").build().is_err());

        let executor = ExecutorConfig {
            preview_chars: 0,
            ..ExecutorConfig::default()
        };
        let err = AnalysisConfig::builder().executor(executor).build().unwrap_err();
        assert!(matches!(err, AnalysisError::Executor(_)));
    }

    #[test]
    fn test_with_lookup() {
        let config = AnalysisConfig::default().with_lookup(|key| match key {
            "STOCKFLOW_PARALLEL_STAGES" => Some("yes".to_string()),
            "STOCKFLOW_MAX_CONCURRENT_SUBJECTS" => Some(" 8 ".to_string()),
            "STOCKFLOW_ANALYSIS_DATE" => Some("2025-01-02".to_string()),
            "STOCKFLOW_DEBUG" => Some("1".to_string()),
            _ => None,
        });

        assert!(config.parallel_stages);
        assert_eq!(config.max_concurrent_subjects, 8);
        assert_eq!(config.analysis_date.as_deref(), Some("2025-01-02"));
        assert!(config.executor.debug);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"parallel_stages": true, "executor": {"debug": true}}"#).unwrap();
        assert!(config.parallel_stages);
        assert!(config.executor.debug);
        assert_eq!(config.max_concurrent_subjects, 4);
    }
}
