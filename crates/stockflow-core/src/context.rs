//! Seed values for a sequence run
//!
//! A [`Context`] holds the free-form values a caller wants folded into every
//! step's arguments: the analysis date, reports written by earlier stages,
//! or anything a tool may care about. Executors only read it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Keys the analysis pipeline seeds itself
pub mod keys {
    /// Date the analysis is performed for, formatted `%Y-%m-%d`
    pub const ANALYSIS_DATE: &str = "analysis_date";
}

/// Lowest-priority step arguments
///
/// Subject identifiers, static step arguments and resolved parameters all
/// win over a value seeded here.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stockflow_core::Context;
///
/// let ctx = Context::new()
///     .with_analysis_date("2024-06-30")
///     .with_value("financial_report", json!("Margins widened."));
///
/// assert_eq!(ctx.analysis_date(), Some("2024-06-30"));
/// assert_eq!(ctx.text("financial_report"), Some("Margins widened."));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the date the analysis is run for
    pub fn with_analysis_date(self, date: impl Into<String>) -> Self {
        self.with_value(keys::ANALYSIS_DATE, Value::String(date.into()))
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn analysis_date(&self) -> Option<&str> {
        self.text(keys::ANALYSIS_DATE)
    }

    /// The value under `key` when it is a JSON string
    pub fn text(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Set `key`, returning whatever it held before
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Fold `other` in; its entries replace ours on conflict
    pub fn merge(&mut self, other: Context) {
        self.values.extend(other.values);
    }

    /// Snapshot as a JSON argument object
    pub fn to_args(&self) -> Map<String, Value> {
        self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
