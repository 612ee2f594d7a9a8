//! Sequential tool executor
//!
//! The SequentialToolExecutor runs a [`Sequence`] one step at a time:
//! 1. Resolve the step's arguments from earlier outputs
//! 2. Look the tool up in the registry and invoke it
//! 3. Record the outcome
//! 4. On failure, ask the continuation policy whether to go on
//!
//! Every failure is caught at the step boundary; `execute` always returns a
//! complete [`ExecutionResult`].

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use stockflow_core::Context;
use stockflow_tools::ToolRegistry;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ConfigError, StepError};
use crate::policy::{Continuation, ContinuationPolicy};
use crate::resolve::{ToolResults, resolve};
use crate::result::ExecutionResult;
use crate::step::{ExecutionStep, Sequence};

/// Runs declared step sequences against a tool registry
///
/// The executor holds no per-run state, so one instance can serve many
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct SequentialToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: ContinuationPolicy,
    config: ExecutorConfig,
}

impl SequentialToolExecutor {
    /// Create an executor with the default configuration
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            policy: ContinuationPolicy::default(),
            config: ExecutorConfig::default(),
        }
    }

    pub fn builder() -> SequentialToolExecutorBuilder {
        SequentialToolExecutorBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &ContinuationPolicy {
        &self.policy
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every step of `sequence` for one subject
    pub async fn execute(
        &self,
        sequence: &Sequence,
        subject_id: &str,
        subject_name: &str,
        context: Option<&Context>,
    ) -> ExecutionResult {
        self.execute_steps(sequence.name(), sequence.steps(), subject_id, subject_name, context)
            .await
    }

    /// Run an ad hoc list of steps under `name`
    pub async fn execute_steps(
        &self,
        name: &str,
        steps: &[ExecutionStep],
        subject_id: &str,
        subject_name: &str,
        context: Option<&Context>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::start(name, subject_id, subject_name);
        info!(
            "Executing sequence '{}' ({} steps) for {} ({}), run {}",
            name,
            steps.len(),
            subject_name,
            subject_id,
            result.run_id()
        );

        for (index, step) in steps.iter().enumerate() {
            let step_number = index + 1;
            let executed_at = Utc::now();
            let started = Instant::now();

            let outcome = self
                .run_step(step, result.tool_results(), subject_id, subject_name, context)
                .await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match outcome {
                Ok(value) => {
                    debug!(
                        "Step {}/{} ({}) succeeded in {}ms",
                        step_number,
                        steps.len(),
                        step.tool_name(),
                        duration_ms
                    );
                    if self.config.debug {
                        debug!("{} -> {}", step.tool_name(), self.preview(&value));
                    }
                    result.record_success(
                        step.tool_name(),
                        step.description(),
                        value,
                        executed_at,
                        duration_ms,
                    );
                }
                Err(err) => {
                    let decision = self.policy.decide(step, &err);
                    let placeholder = match (&decision, &err) {
                        (Continuation::Proceed(_), StepError::SemanticFailure { payload, .. }) => {
                            Some(payload.clone())
                        }
                        _ => None,
                    };
                    result.record_failure(
                        step.tool_name(),
                        step.description(),
                        &err,
                        placeholder,
                        executed_at,
                        duration_ms,
                    );

                    match decision {
                        Continuation::Proceed(reason) => {
                            warn!(
                                "Step {}/{} ({}) failed, continuing ({}): {}",
                                step_number,
                                steps.len(),
                                step.tool_name(),
                                reason,
                                err
                            );
                        }
                        Continuation::Halt => {
                            error!(
                                "Step {}/{} ({}) failed, stopping sequence '{}': {}",
                                step_number,
                                steps.len(),
                                step.tool_name(),
                                name,
                                err
                            );
                            break;
                        }
                    }
                }
            }
        }

        result.finish();
        info!(
            "Sequence '{}' finished: {} of {} steps attempted, success={}",
            name,
            result.steps().len(),
            steps.len(),
            result.success()
        );
        result
    }

    async fn run_step(
        &self,
        step: &ExecutionStep,
        tool_results: &ToolResults,
        subject_id: &str,
        subject_name: &str,
        context: Option<&Context>,
    ) -> Result<Value, StepError> {
        let tool = self
            .registry
            .get(step.tool_name())
            .ok_or_else(|| StepError::ToolNotFound {
                tool: step.tool_name().to_string(),
            })?;

        let args = resolve(step, tool_results, subject_id, subject_name, context)?;
        debug!(
            "Invoking {} with arguments [{}]",
            step.tool_name(),
            args.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );

        let value = tool
            .execute(Value::Object(args))
            .await
            .map_err(|source| StepError::ToolInvocation {
                tool: step.tool_name().to_string(),
                source,
            })?;

        match reported_failure(&value) {
            Some(message) => Err(StepError::SemanticFailure {
                tool: step.tool_name().to_string(),
                message,
                payload: value,
            }),
            None => Ok(value),
        }
    }

    fn preview(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let limit = self.config.preview_chars;
        if text.chars().count() <= limit {
            text
        } else {
            let mut cut: String = text.chars().take(limit).collect();
            cut.push_str("...");
            cut
        }
    }
}

/// The failure message a tool reported in its own payload, if any
///
/// A payload reports failure when it is an object (or JSON text of one)
/// carrying a truthy `error` field, or `"success": false`.
fn reported_failure(value: &Value) -> Option<String> {
    let parsed;
    let object = match value {
        Value::Object(map) => map,
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).ok()?;
            parsed.as_object()?
        }
        _ => return None,
    };

    match object.get("error") {
        Some(Value::String(message)) if !message.is_empty() => return Some(message.clone()),
        Some(other) if !other.is_string() && is_truthy(other) => return Some(other.to_string()),
        _ => {}
    }

    if object.get("success") == Some(&Value::Bool(false)) {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("tool reported success=false");
        return Some(message.to_string());
    }

    None
}

/// Empty strings, collections, zero, `false` and `null` are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Builder for SequentialToolExecutor
#[derive(Debug)]
pub struct SequentialToolExecutorBuilder {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    policy: Option<ContinuationPolicy>,
}

impl SequentialToolExecutorBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new()),
            config: ExecutorConfig::default(),
            policy: None,
        }
    }

    /// Set the tool registry
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the full configuration
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the policy derived from the configuration
    pub fn policy(mut self, policy: ContinuationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Enable per-step debug logging
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the executor
    pub fn build(self) -> Result<SequentialToolExecutor, ConfigError> {
        self.config.validate()?;
        let policy = match self.policy {
            Some(policy) => policy,
            None => ContinuationPolicy::from_config(&self.config)?,
        };

        Ok(SequentialToolExecutor {
            registry: self.registry,
            policy,
            config: self.config,
        })
    }
}

impl Default for SequentialToolExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
