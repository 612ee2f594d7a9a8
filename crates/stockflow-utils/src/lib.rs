//! Shared utilities for stockflow
//!
//! This crate provides common functionality used across the stockflow workspace:
//! tracing setup and process-level configuration.

pub mod config;
pub mod logging;

pub use config::{Config, LogFormat};
pub use logging::{init_tracing, init_tracing_with};
