//! Configuration for sequence execution

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tools whose failure never halts a sequence unless a step says otherwise
pub const DEFAULT_NON_CRITICAL_TOOLS: &[&str] = &["get_market_sentiment", "get_news_analysis"];

/// Error-text patterns treated as transient network conditions
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &["network", "timeout"];

/// Configuration for [`SequentialToolExecutor`](crate::SequentialToolExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Tool names on the non-critical allow-list
    pub non_critical_tools: Vec<String>,

    /// Case-insensitive regexes matched against error text
    pub transient_patterns: Vec<String>,

    /// Log argument names and result previews for every step
    pub debug: bool,

    /// Maximum characters of a result preview in debug logs
    pub preview_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            non_critical_tools: DEFAULT_NON_CRITICAL_TOOLS.iter().map(ToString::to_string).collect(),
            transient_patterns: DEFAULT_TRANSIENT_PATTERNS.iter().map(ToString::to_string).collect(),
            debug: false,
            preview_chars: 200,
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration builder
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }

    /// Overlay `STOCKFLOW_*` environment variables
    ///
    /// `STOCKFLOW_NON_CRITICAL_TOOLS` and `STOCKFLOW_TRANSIENT_PATTERNS` are
    /// comma separated lists; `STOCKFLOW_DEBUG` accepts `1`/`true`.
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(tools) = lookup("STOCKFLOW_NON_CRITICAL_TOOLS") {
            self.non_critical_tools = split_list(&tools);
        }
        if let Some(patterns) = lookup("STOCKFLOW_TRANSIENT_PATTERNS") {
            self.transient_patterns = split_list(&patterns);
        }
        if let Some(debug) = lookup("STOCKFLOW_DEBUG") {
            self.debug = matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_chars == 0 {
            return Err(ConfigError::Invalid(
                "preview_chars must be greater than 0".to_string(),
            ));
        }

        if let Some(blank) = self.non_critical_tools.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "non_critical_tools contains a blank name: {blank:?}"
            )));
        }

        for pattern in &self.transient_patterns {
            compile_pattern(pattern)?;
        }

        Ok(())
    }
}

/// Compile a transient-error pattern, matching case-insensitively
pub(crate) fn compile_pattern(pattern: &str) -> Result<regex::Regex, ConfigError> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Builder for ExecutorConfig
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    non_critical_tools: Option<Vec<String>>,
    transient_patterns: Option<Vec<String>>,
    debug: Option<bool>,
    preview_chars: Option<usize>,
}

impl ExecutorConfigBuilder {
    /// Replace the non-critical allow-list
    pub fn non_critical_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_critical_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the transient error patterns
    pub fn transient_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transient_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Enable per-step debug logging
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Set the result preview length
    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = Some(chars);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ExecutorConfig, ConfigError> {
        let defaults = ExecutorConfig::default();

        let config = ExecutorConfig {
            non_critical_tools: self.non_critical_tools.unwrap_or(defaults.non_critical_tools),
            transient_patterns: self.transient_patterns.unwrap_or(defaults.transient_patterns),
            debug: self.debug.unwrap_or(defaults.debug),
            preview_chars: self.preview_chars.unwrap_or(defaults.preview_chars),
        };

        config.validate()?;
        Ok(config)
    }
}
