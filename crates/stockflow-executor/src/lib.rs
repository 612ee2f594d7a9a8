//! Step-dependency orchestration for stockflow
//!
//! This crate runs declared sequences of tool invocations, threading each
//! step's output into the arguments of the steps that depend on it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockflow_executor::{SequentialToolExecutor, sequences};
//! use stockflow_tools::ToolRegistry;
//!
//! # async fn run(registry: ToolRegistry) {
//! let executor = SequentialToolExecutor::new(Arc::new(registry));
//! let result = executor
//!     .execute(sequences::financial_analysis(), "600519", "Kweichow Moutai", None)
//!     .await;
//! println!("{}", result.summary());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod param;
pub mod policy;
pub mod resolve;
pub mod result;
pub mod sequences;
pub mod step;
pub mod validate;

// Re-export for convenience
pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use error::{ConfigError, StepError, StepErrorKind};
pub use executor::{SequentialToolExecutor, SequentialToolExecutorBuilder};
pub use param::{AggregateField, ParamParseError, ParamSource, PathSegment};
pub use policy::{Continuation, ContinuationPolicy, ToleranceReason};
pub use resolve::{ToolResults, resolve};
pub use result::{ExecutionResult, StepOutcome, StepPayload};
pub use step::{ExecutionStep, OnFailure, Sequence, SequenceBuilder};
pub use validate::{ValidationError, ValidationIssue};
