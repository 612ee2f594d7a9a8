//! Configuration management utilities

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown log format: {other}"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "stockflow".to_string(),
            environment: "development".to_string(),
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Build a configuration from `STOCKFLOW_*` environment variables
    ///
    /// Recognised: `STOCKFLOW_ENV`, `STOCKFLOW_LOG`, `STOCKFLOW_LOG_FORMAT`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(env) = lookup("STOCKFLOW_ENV") {
            config.environment = env;
        }
        if let Some(filter) = lookup("STOCKFLOW_LOG") {
            config.log_filter = filter;
        }
        if let Some(format) = lookup("STOCKFLOW_LOG_FORMAT") {
            config.log_format = format
                .parse()
                .context("invalid STOCKFLOW_LOG_FORMAT")?;
        }
        Ok(config)
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Whether this is a production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production") || self.environment == "prod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.app_name, "stockflow");
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.is_production());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STOCKFLOW_ENV", "prod"),
            ("STOCKFLOW_LOG", "stockflow_executor=debug"),
            ("STOCKFLOW_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert!(config.is_production());
        assert_eq!(config.log_filter, "stockflow_executor=debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_from_lookup_rejects_bad_format() {
        let err = Config::from_lookup(|k| (k == "STOCKFLOW_LOG_FORMAT").then(|| "xml".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STOCKFLOW_LOG_FORMAT"));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"environment": "staging", "log_format": "json"}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.app_name, "stockflow");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/stockflow.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
