//! Tool management for stockflow
//!
//! A tool is a named unit of work (data fetch, calculation, or LLM call)
//! invoked with a JSON object of arguments. Sequences refer to tools by
//! name; the `ToolRegistry` resolves those names at run time.

pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool};
