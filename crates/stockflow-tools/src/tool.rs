//! Tool trait definition

use async_trait::async_trait;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use stockflow_core::Result;

/// Trait for named operations a sequence can invoke
///
/// A tool receives its arguments as a JSON object and returns either a
/// mapping or text. Semantic failures may be reported in-band through an
/// `"error"` field; fatal failures are returned as `Err`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool with given parameters
    ///
    /// # Arguments
    ///
    /// * `params` - Tool input as a JSON object
    ///
    /// # Returns
    ///
    /// Tool output as JSON value
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Get the tool's name
    ///
    /// Must be unique within a ToolRegistry and match the `tool_name` used
    /// by execution steps.
    fn name(&self) -> &str;

    /// Get the tool's description
    fn description(&self) -> &str;

    /// Get the tool's input schema (JSON Schema format)
    ///
    /// When the schema lists `properties`, sequence validation checks that
    /// parameter mappings only target declared arguments.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let schema = json!({
    ///     "type": "object",
    ///     "properties": {
    ///         "stock_code": { "type": "string" },
    ///         "years": { "type": "integer" }
    ///     },
    ///     "required": ["stock_code"]
    /// });
    /// ```
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type Handler = Box<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A tool backed by an async closure
///
/// # Example
///
/// ```
/// use serde_json::{json, Value};
/// use stockflow_tools::{FnTool, Tool};
///
/// let tool = FnTool::new("get_market_data", |params: Value| async move {
///     Ok(json!({ "stock_code": params["stock_code"], "price": 12.5 }))
/// })
/// .with_description("Fetch the latest quote");
///
/// assert_eq!(tool.name(), "get_market_data");
/// ```
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    handler: Handler,
}

impl FnTool {
    /// Create a tool from a name and an async handler
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            schema: json!({ "type": "object" }),
            handler: Box::new(move |params| Box::pin(handler(params))),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    async fn execute(&self, params: Value) -> Result<Value> {
        (self.handler)(params).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }
}
