//! Parameter sources: where a step argument comes from
//!
//! A step's `param_mapping` maps each target argument to a [`ParamSource`].
//! Sources are normally written in their tagged form, but the compact string
//! form used by older sequence files is still accepted:
//!
//! | string                      | source                                  |
//! |-----------------------------|-----------------------------------------|
//! | `"key"`                     | `Key { step: None, key }`               |
//! | `"__full_result__"`         | `FullResult { step: None }`             |
//! | `"step.__full_result__"`    | `FullResult { step: Some(step) }`       |
//! | `"step.key"`                | `Key { step: Some(step), key }`         |
//! | `"step.a[0].b"`, `"a[0]"`   | `Path { .. }`                           |
//! | `"__all_results__"`         | `Aggregate` over the financial results  |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::sequences::tools;

/// Sentinel for "pass the whole output unchanged"
pub const FULL_RESULT: &str = "__full_result__";

/// Sentinel for "pass an aggregate of every result so far"
pub const ALL_RESULTS: &str = "__all_results__";

/// One hop inside a JSON value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index
    Index(usize),
    /// Object key
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

/// One entry of an aggregate view: `name` in the output, read from `tool`'s result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateField {
    pub name: String,
    pub tool: String,
}

impl AggregateField {
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
        }
    }
}

/// Fields the legacy `__all_results__` sentinel expands to
pub fn default_aggregate_fields() -> Vec<AggregateField> {
    vec![
        AggregateField::new("financial_data", tools::GET_FINANCIAL_DATA),
        AggregateField::new("financial_ratios", tools::CALCULATE_FINANCIAL_RATIOS),
        AggregateField::new("health_score", tools::CALCULATE_FINANCIAL_HEALTH_SCORE),
    ]
}

/// Source of a single step argument
///
/// `step: None` always means the step's declared dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ParamSourceRepr", try_from = "ParamSourceRepr")]
pub enum ParamSource {
    /// A constant
    Literal(Value),
    /// A top-level key of a step's output
    Key { step: Option<String>, key: String },
    /// A step's entire output, unchanged
    FullResult { step: Option<String> },
    /// A nested location inside a step's output
    Path {
        step: Option<String>,
        path: Vec<PathSegment>,
    },
    /// An object assembled from several steps' outputs plus the subject identifiers
    Aggregate { fields: Vec<AggregateField> },
}

/// Errors parsing the compact string form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamParseError {
    #[error("empty parameter source")]
    Empty,

    #[error("empty path segment in '{0}'")]
    EmptySegment(String),

    #[error("invalid index '{index}' in '{spec}'")]
    InvalidIndex { spec: String, index: String },

    #[error("unclosed '[' in '{0}'")]
    UnclosedBracket(String),

    #[error("'{0}' must start with a step name")]
    MissingStep(String),
}

impl ParamSource {
    pub fn literal(value: Value) -> Self {
        ParamSource::Literal(value)
    }

    /// Key of the dependency's output
    pub fn key(key: impl Into<String>) -> Self {
        ParamSource::Key {
            step: None,
            key: key.into(),
        }
    }

    /// Key of a named step's output
    pub fn key_of(step: impl Into<String>, key: impl Into<String>) -> Self {
        ParamSource::Key {
            step: Some(step.into()),
            key: key.into(),
        }
    }

    /// The dependency's whole output
    pub fn full_result() -> Self {
        ParamSource::FullResult { step: None }
    }

    /// A named step's whole output
    pub fn full_result_of(step: impl Into<String>) -> Self {
        ParamSource::FullResult {
            step: Some(step.into()),
        }
    }

    /// A nested location in a named step's output
    pub fn path_of(step: impl Into<String>, path: Vec<PathSegment>) -> Self {
        ParamSource::Path {
            step: Some(step.into()),
            path,
        }
    }

    pub fn aggregate(fields: Vec<AggregateField>) -> Self {
        ParamSource::Aggregate { fields }
    }

    /// The aggregate the legacy `__all_results__` sentinel denotes
    pub fn all_results() -> Self {
        ParamSource::Aggregate {
            fields: default_aggregate_fields(),
        }
    }

    /// Parse the compact string form
    pub fn parse(spec: &str) -> Result<Self, ParamParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ParamParseError::Empty);
        }
        match spec {
            FULL_RESULT => return Ok(Self::full_result()),
            ALL_RESULTS => return Ok(Self::all_results()),
            _ => {}
        }
        if !spec.contains(['.', '[']) {
            return Ok(Self::key(spec));
        }

        let mut segments = parse_path(spec)?;
        if !spec.contains('.') {
            return Ok(ParamSource::Path {
                step: None,
                path: segments,
            });
        }

        let step = match segments.first() {
            Some(PathSegment::Key(step)) => step.clone(),
            _ => return Err(ParamParseError::MissingStep(spec.to_string())),
        };
        segments.remove(0);

        Ok(match segments.as_slice() {
            [PathSegment::Key(k)] if k == FULL_RESULT => Self::full_result_of(step),
            [PathSegment::Key(k)] => Self::key_of(step, k.clone()),
            _ => Self::path_of(step, segments),
        })
    }

    /// Explicitly named steps this source reads from
    pub fn referenced_steps(&self) -> Vec<&str> {
        match self {
            ParamSource::Literal(_) => Vec::new(),
            ParamSource::Key { step, .. }
            | ParamSource::FullResult { step }
            | ParamSource::Path { step, .. } => step.as_deref().into_iter().collect(),
            ParamSource::Aggregate { fields } => fields.iter().map(|f| f.tool.as_str()).collect(),
        }
    }

    /// Whether this source reads the step's declared dependency
    pub fn uses_dependency(&self) -> bool {
        matches!(
            self,
            ParamSource::Key { step: None, .. }
                | ParamSource::FullResult { step: None }
                | ParamSource::Path { step: None, .. }
        )
    }
}

fn parse_path(spec: &str) -> Result<Vec<PathSegment>, ParamParseError> {
    let mut segments = Vec::new();
    for token in spec.split('.') {
        if token.is_empty() {
            return Err(ParamParseError::EmptySegment(spec.to_string()));
        }
        let (name, mut rest) = match token.find('[') {
            Some(i) => (&token[..i], &token[i..]),
            None => (token, ""),
        };
        if !name.is_empty() {
            segments.push(PathSegment::Key(name.to_string()));
        }
        while !rest.is_empty() {
            let inner = rest
                .strip_prefix('[')
                .ok_or_else(|| ParamParseError::InvalidIndex {
                    spec: spec.to_string(),
                    index: rest.to_string(),
                })?;
            let close = inner
                .find(']')
                .ok_or_else(|| ParamParseError::UnclosedBracket(spec.to_string()))?;
            let raw = &inner[..close];
            let index = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ParamParseError::InvalidIndex {
                    spec: spec.to_string(),
                    index: raw.to_string(),
                })?;
            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }
    }
    Ok(segments)
}

impl std::str::FromStr for ParamSource {
    type Err = ParamParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[PathSegment]) -> fmt::Result {
    for (i, segment) in path.iter().enumerate() {
        match segment {
            PathSegment::Key(k) if i > 0 => write!(f, ".{k}")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Literal(v) => write!(f, "{v}"),
            ParamSource::Key { step: None, key } => f.write_str(key),
            ParamSource::Key {
                step: Some(step),
                key,
            } => write!(f, "{step}.{key}"),
            ParamSource::FullResult { step: None } => f.write_str(FULL_RESULT),
            ParamSource::FullResult { step: Some(step) } => write!(f, "{step}.{FULL_RESULT}"),
            ParamSource::Path { step, path } => {
                if let Some(step) = step {
                    write!(f, "{step}")?;
                    if matches!(path.first(), Some(PathSegment::Key(_))) {
                        f.write_str(".")?;
                    }
                }
                write_path(f, path)
            }
            ParamSource::Aggregate { fields } => {
                let tools: Vec<&str> = fields.iter().map(|f| f.tool.as_str()).collect();
                write!(f, "{ALL_RESULTS}({})", tools.join(","))
            }
        }
    }
}

// =========== Serde representation ===========

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ParamSourceRepr {
    Compact(String),
    Tagged(TaggedSource),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
enum TaggedSource {
    Literal {
        value: Value,
    },
    Key {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        key: String,
    },
    FullResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
    },
    Path {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        path: Vec<PathSegment>,
    },
    Aggregate {
        fields: Vec<AggregateField>,
    },
}

impl From<ParamSource> for ParamSourceRepr {
    fn from(source: ParamSource) -> Self {
        ParamSourceRepr::Tagged(match source {
            ParamSource::Literal(value) => TaggedSource::Literal { value },
            ParamSource::Key { step, key } => TaggedSource::Key { step, key },
            ParamSource::FullResult { step } => TaggedSource::FullResult { step },
            ParamSource::Path { step, path } => TaggedSource::Path { step, path },
            ParamSource::Aggregate { fields } => TaggedSource::Aggregate { fields },
        })
    }
}

impl TryFrom<ParamSourceRepr> for ParamSource {
    type Error = ParamParseError;

    fn try_from(repr: ParamSourceRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            ParamSourceRepr::Compact(spec) => ParamSource::parse(&spec)?,
            ParamSourceRepr::Tagged(TaggedSource::Literal { value }) => ParamSource::Literal(value),
            ParamSourceRepr::Tagged(TaggedSource::Key { step, key }) => ParamSource::Key { step, key },
            ParamSourceRepr::Tagged(TaggedSource::FullResult { step }) => {
                ParamSource::FullResult { step }
            }
            ParamSourceRepr::Tagged(TaggedSource::Path { step, path }) => {
                ParamSource::Path { step, path }
            }
            ParamSourceRepr::Tagged(TaggedSource::Aggregate { fields }) => {
                ParamSource::Aggregate { fields }
            }
        })
    }
}
