//! Parameter resolution
//!
//! Turns a step's declarative mapping into a concrete argument object. The
//! resolver is a pure function of its inputs: it never mutates the
//! accumulated results and resolving the same step twice yields the same
//! arguments.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use stockflow_core::Context;
use tracing::{debug, warn};

use crate::error::StepError;
use crate::param::{AggregateField, ParamSource, PathSegment};
use crate::step::ExecutionStep;

/// Argument carrying the subject identifier
pub const SUBJECT_ID_ARG: &str = "subject_id";

/// Argument carrying the subject display name
pub const SUBJECT_NAME_ARG: &str = "subject_name";

/// Argument used when a step has a dependency but no mapping
pub const PREVIOUS_RESULT_ARG: &str = "previous_result";

/// Outputs accumulated so far, keyed by tool name
pub type ToolResults = BTreeMap<String, Value>;

/// Build the argument object for `step`
///
/// Precedence, lowest first: `context`, subject identifiers, the step's
/// static arguments, resolved mappings.
pub fn resolve(
    step: &ExecutionStep,
    tool_results: &ToolResults,
    subject_id: &str,
    subject_name: &str,
    context: Option<&Context>,
) -> Result<Map<String, Value>, StepError> {
    let mut args = context.map(Context::to_args).unwrap_or_default();
    args.insert(SUBJECT_ID_ARG.to_string(), Value::String(subject_id.to_string()));
    args.insert(SUBJECT_NAME_ARG.to_string(), Value::String(subject_name.to_string()));
    args.extend(
        step.required_args()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let Some(dependency) = step.dependency() else {
        return Ok(args);
    };
    let Some(dependency_result) = tool_results.get(dependency) else {
        debug!(
            "Dependency '{}' of '{}' has no result; skipping parameter mapping",
            dependency,
            step.tool_name()
        );
        return Ok(args);
    };

    if step.param_mapping().is_empty() {
        args.insert(PREVIOUS_RESULT_ARG.to_string(), dependency_result.clone());
        args.insert(format!("{dependency}_result"), dependency_result.clone());
        return Ok(args);
    }

    let scope = Scope {
        step: step.tool_name(),
        dependency,
        tool_results,
        subject_id,
        subject_name,
    };
    for (target, source) in step.param_mapping() {
        if let Some(value) = scope.value_of(source)? {
            args.insert(target.clone(), value);
        } else {
            debug!(
                "Parameter '{}' of '{}' omitted: source '{}' has no result",
                target,
                step.tool_name(),
                source
            );
        }
    }

    Ok(args)
}

struct Scope<'a> {
    step: &'a str,
    dependency: &'a str,
    tool_results: &'a ToolResults,
    subject_id: &'a str,
    subject_name: &'a str,
}

impl Scope<'_> {
    fn value_of(&self, source: &ParamSource) -> Result<Option<Value>, StepError> {
        match source {
            ParamSource::Literal(value) => Ok(Some(value.clone())),
            ParamSource::FullResult { step } => Ok(self.producer(step.as_deref()).1.cloned()),
            ParamSource::Key { step, key } => {
                let (producer, Some(raw)) = self.producer(step.as_deref()) else {
                    return Ok(None);
                };
                let payload = self.normalize(producer, raw)?;
                let Value::Object(map) = &*payload else {
                    return Err(StepError::malformed(
                        self.step,
                        format!("output of '{producer}' is not an object, cannot read key '{key}'"),
                    ));
                };
                match map.get(key) {
                    Some(value) => Ok(Some(value.clone())),
                    None => {
                        warn!(
                            "Key '{}' missing from '{}' output; passing the full result to '{}'",
                            key, producer, self.step
                        );
                        Ok(Some(raw.clone()))
                    }
                }
            }
            ParamSource::Path { step, path } => {
                let (producer, Some(raw)) = self.producer(step.as_deref()) else {
                    return Ok(None);
                };
                let payload = self.normalize(producer, raw)?;
                self.walk(producer, &payload, path).map(Some)
            }
            ParamSource::Aggregate { fields } => Ok(Some(self.aggregate(fields))),
        }
    }

    fn producer<'s>(&'s self, step: Option<&'s str>) -> (&'s str, Option<&'s Value>) {
        let producer = step.unwrap_or(self.dependency);
        (producer, self.tool_results.get(producer))
    }

    /// Parse serialized text and strip a response wrapper
    fn normalize<'v>(&self, producer: &str, raw: &'v Value) -> Result<Cow<'v, Value>, StepError> {
        let parsed = parse_text(self.step, producer, Cow::Borrowed(raw))?;
        let inner = unwrap_response(producer, &parsed).cloned();
        let unwrapped = match inner {
            Some(inner) => Cow::Owned(inner),
            None => parsed,
        };
        parse_text(self.step, producer, unwrapped)
    }

    fn walk(&self, producer: &str, root: &Value, path: &[PathSegment]) -> Result<Value, StepError> {
        let mut current = root;
        for (depth, segment) in path.iter().enumerate() {
            let next = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key),
                (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            current = next.ok_or_else(|| {
                StepError::malformed(
                    self.step,
                    format!(
                        "path '{}' not found in output of '{producer}'",
                        ParamSource::Path {
                            step: None,
                            path: path[..=depth].to_vec(),
                        }
                    ),
                )
            })?;
        }
        Ok(current.clone())
    }

    fn aggregate(&self, fields: &[AggregateField]) -> Value {
        let mut view: Map<String, Value> = fields
            .iter()
            .map(|field| {
                let value = self
                    .tool_results
                    .get(&field.tool)
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                (field.name.clone(), value)
            })
            .collect();
        view.insert(SUBJECT_ID_ARG.to_string(), Value::String(self.subject_id.to_string()));
        view.insert(SUBJECT_NAME_ARG.to_string(), Value::String(self.subject_name.to_string()));
        Value::Object(view)
    }
}

fn parse_text<'v>(step: &str, producer: &str, value: Cow<'v, Value>) -> Result<Cow<'v, Value>, StepError> {
    if let Value::String(text) = &*value {
        return serde_json::from_str::<Value>(text).map(Cow::Owned).map_err(|e| {
            StepError::malformed(step, format!("output of '{producer}' is text that is not JSON: {e}"))
        });
    }
    Ok(value)
}

/// Inner payload of a `{producer}_response` or `response` wrapper
///
/// A `response` key next to sibling keys only counts as a wrapper when it
/// holds an object, so status text alongside a reply is left alone.
fn unwrap_response<'v>(producer: &str, value: &'v Value) -> Option<&'v Value> {
    let Value::Object(map) = value else {
        return None;
    };
    if let Some(inner) = map.get(&format!("{producer}_response")) {
        return Some(inner);
    }
    match map.get("response") {
        Some(inner) if map.len() == 1 || inner.is_object() => Some(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::AggregateField;
    use serde_json::json;

    fn results(entries: &[(&str, Value)]) -> ToolResults {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn resolve_simple(step: &ExecutionStep, tool_results: &ToolResults) -> Result<Map<String, Value>, StepError> {
        resolve(step, tool_results, "002594", "BYD", None)
    }

    #[test]
    fn test_base_arguments_and_precedence() {
        let context = Context::new()
            .with_analysis_date("2024-06-30")
            .with_value("years", json!(10))
            .with_value(SUBJECT_ID_ARG, json!("overridden"));
        let step = ExecutionStep::new("get_financial_data", "").with_arg("years", json!(3));

        let args = resolve(&step, &ToolResults::new(), "002594", "BYD", Some(&context)).unwrap();

        assert_eq!(args["subject_id"], json!("002594"));
        assert_eq!(args["subject_name"], json!("BYD"));
        assert_eq!(args["analysis_date"], json!("2024-06-30"));
        assert_eq!(args["years"], json!(3));
    }

    #[test]
    fn test_full_result_round_trip() {
        let payload = json!({"v": 1, "nested": {"rows": [1, 2, 3]}, "text": "x".repeat(4096)});
        let tool_results = results(&[("A", payload.clone())]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::full_result());

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["x"], payload);
    }

    #[test]
    fn test_full_result_of_text_is_untouched() {
        let tool_results = results(&[("A", json!("{\"v\": 1}"))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::full_result());

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["x"], json!("{\"v\": 1}"));
    }

    #[test]
    fn test_default_mapping_without_param_mapping() {
        let tool_results = results(&[("A", json!({"v": 1}))]);
        let step = ExecutionStep::new("B", "").depends_on("A");

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args[PREVIOUS_RESULT_ARG], json!({"v": 1}));
        assert_eq!(args["A_result"], json!({"v": 1}));
    }

    #[test]
    fn test_missing_dependency_skips_mapping() {
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::full_result());

        let args = resolve_simple(&step, &ToolResults::new()).unwrap();
        assert!(!args.contains_key("x"));
        assert!(!args.contains_key(PREVIOUS_RESULT_ARG));
    }

    #[test]
    fn test_key_lookup_with_fallback() {
        let tool_results = results(&[("A", json!({"ratios": {"roe": 0.2}}))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("ratios", ParamSource::key("ratios"))
            .map_param("other", ParamSource::key("absent"));

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["ratios"], json!({"roe": 0.2}));
        assert_eq!(args["other"], json!({"ratios": {"roe": 0.2}}));
    }

    #[test]
    fn test_key_lookup_parses_serialized_text() {
        let tool_results = results(&[("A", json!("{\"price\": 12.5}"))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("price", ParamSource::key("price"));

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["price"], json!(12.5));
    }

    #[test]
    fn test_key_lookup_unwraps_response() {
        let tool_results = results(&[
            ("A", json!({"A_response": {"price": 1.0}, "meta": "x"})),
            ("C", json!({"response": "{\"price\": 2.0}"})),
            ("D", json!({"response": {"price": 12.5}, "status": "ok"})),
            ("E", json!({"response": "plain reply", "status": "ok"})),
        ]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("a", ParamSource::key("price"))
            .map_param("c", ParamSource::key_of("C", "price"))
            .map_param("d", ParamSource::key_of("D", "price"))
            .map_param("e", ParamSource::key_of("E", "status"));

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["a"], json!(1.0));
        assert_eq!(args["c"], json!(2.0));
        assert_eq!(args["d"], json!(12.5));
        assert_eq!(args["e"], json!("ok"));
    }

    #[test]
    fn test_malformed_text_dependency() {
        let tool_results = results(&[("A", json!("not json at all"))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::key("price"));

        let err = resolve_simple(&step, &tool_results).unwrap_err();
        assert!(matches!(err, StepError::MalformedDependency { ref step, .. } if step == "B"));
    }

    #[test]
    fn test_key_lookup_on_non_object() {
        let tool_results = results(&[("A", json!([1, 2, 3]))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::key("price"));

        let err = resolve_simple(&step, &tool_results).unwrap_err();
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_path_into_other_step() {
        let tool_results = results(&[
            ("get_financial_data", json!({"annual_reports": [{"roe": 0.18}, {"roe": 0.15}]})),
            ("calculate_financial_ratios", json!({})),
        ]);
        let step = ExecutionStep::new("score", "")
            .depends_on("calculate_financial_ratios")
            .map_param_str("latest_roe", "get_financial_data.annual_reports[0].roe")
            .unwrap();

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["latest_roe"], json!(0.18));
    }

    #[test]
    fn test_path_out_of_range() {
        let tool_results = results(&[("A", json!({"rows": []}))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param_str("x", "rows[3]")
            .unwrap();

        let err = resolve_simple(&step, &tool_results).unwrap_err();
        assert!(err.to_string().contains("'rows[3]'"));
    }

    #[test]
    fn test_reference_to_absent_step_is_omitted() {
        let tool_results = results(&[("A", json!({}))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("x", ParamSource::full_result_of("never_ran"))
            .map_param("y", ParamSource::literal(json!(true)));

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert!(!args.contains_key("x"));
        assert_eq!(args["y"], json!(true));
    }

    #[test]
    fn test_aggregate_view() {
        let tool_results = results(&[
            ("get_financial_data", json!({"revenue": 100})),
            ("calculate_financial_ratios", json!({"roe": 0.2})),
            ("calculate_financial_health_score", json!({"score": 82})),
        ]);
        let step = ExecutionStep::new("prepare_analysis_data_for_llm", "")
            .depends_on("calculate_financial_health_score")
            .map_param("analysis_data", ParamSource::all_results());

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(
            args["analysis_data"],
            json!({
                "financial_data": {"revenue": 100},
                "financial_ratios": {"roe": 0.2},
                "health_score": {"score": 82},
                "subject_id": "002594",
                "subject_name": "BYD"
            })
        );
    }

    #[test]
    fn test_aggregate_missing_tool_is_empty_object() {
        let tool_results = results(&[("A", json!(1))]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("all", ParamSource::aggregate(vec![AggregateField::new("m", "missing")]));

        let args = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(args["all"]["m"], json!({}));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let tool_results = results(&[
            ("A", json!("{\"response\": {\"k\": [1, 2]}}")),
            ("get_financial_data", json!({"x": 1})),
        ]);
        let step = ExecutionStep::new("B", "")
            .depends_on("A")
            .map_param("k", ParamSource::key("k"))
            .map_param("all", ParamSource::all_results())
            .map_param("full", ParamSource::full_result());
        let snapshot = tool_results.clone();

        let first = resolve_simple(&step, &tool_results).unwrap();
        let second = resolve_simple(&step, &tool_results).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["k"], json!([1, 2]));
        assert_eq!(tool_results, snapshot);
    }
}
