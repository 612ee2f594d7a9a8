//! Core abstractions for stockflow
//!
//! This crate defines the error type every tool reports through and the
//! seed `Context` that callers hand to a sequence run.

pub mod context;
pub mod error;

pub use context::Context;
pub use error::{Error, Result};
