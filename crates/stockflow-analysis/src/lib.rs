//! Multi-stage equity analysis for stockflow
//!
//! Chains the financial, industry, valuation and integration sequences into
//! one analysis per subject, handing each stage's report to the stages that
//! follow it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockflow_analysis::StageGraph;
//! use stockflow_core::Context;
//! use stockflow_tools::ToolRegistry;
//!
//! # async fn run(registry: ToolRegistry) -> stockflow_analysis::Result<()> {
//! let graph = StageGraph::builder().registry(Arc::new(registry)).build()?;
//! let report = graph.run("600519", "Kweichow Moutai", Context::new()).await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod report;
pub mod result;
pub mod stage;

pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::{AnalysisError, Result};
pub use graph::{StageGraph, StageGraphBuilder};
pub use report::{ReportGenerator, SummaryReportGenerator, ToolReportGenerator};
pub use result::{AnalysisReport, StageReport};
pub use stage::AnalysisStage;
