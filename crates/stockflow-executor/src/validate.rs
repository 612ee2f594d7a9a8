//! Static checks for sequence definitions
//!
//! The executor itself never validates: a bad reference surfaces as a step
//! failure at the point of use. Callers that build sequences once and run
//! them many times check them up front with [`Sequence::validate`] or
//! [`Sequence::validate_against`].

use std::collections::HashSet;
use stockflow_tools::ToolRegistry;
use thiserror::Error;

use crate::step::Sequence;

/// One problem found in a sequence definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptySequence,
    /// The same tool appears at more than one position
    DuplicateTool { tool: String },
    /// `dependency` does not name an earlier step
    UnknownDependency { step: String, dependency: String },
    /// The step maps parameters but has no dependency, so the mapping never applies
    MappingWithoutDependency { step: String },
    /// A mapping source names a step that does not run earlier
    UnknownReference {
        step: String,
        param: String,
        reference: String,
    },
    UnregisteredTool { tool: String },
    /// A mapping target the tool's input schema does not declare
    UndeclaredParameter { step: String, param: String },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::EmptySequence => write!(f, "sequence has no steps"),
            ValidationIssue::DuplicateTool { tool } => {
                write!(f, "tool '{tool}' appears more than once")
            }
            ValidationIssue::UnknownDependency { step, dependency } => {
                write!(f, "'{step}' depends on '{dependency}', which is not an earlier step")
            }
            ValidationIssue::MappingWithoutDependency { step } => {
                write!(f, "'{step}' maps parameters but declares no dependency")
            }
            ValidationIssue::UnknownReference {
                step,
                param,
                reference,
            } => write!(
                f,
                "parameter '{param}' of '{step}' references '{reference}', which is not an earlier step"
            ),
            ValidationIssue::UnregisteredTool { tool } => {
                write!(f, "tool '{tool}' is not registered")
            }
            ValidationIssue::UndeclaredParameter { step, param } => {
                write!(f, "'{step}' does not declare parameter '{param}'")
            }
        }
    }
}

/// A sequence failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sequence '{sequence}' is invalid: {}", render(.issues))]
pub struct ValidationError {
    pub sequence: String,
    pub issues: Vec<ValidationIssue>,
}

fn render(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Sequence {
    /// Check the sequence's internal references
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.check_issues(self.structural_issues())
    }

    /// Check internal references, then each step against `registry`
    pub fn validate_against(&self, registry: &ToolRegistry) -> Result<(), ValidationError> {
        let mut issues = self.structural_issues();

        for step in self {
            let Some(tool) = registry.get(step.tool_name()) else {
                issues.push(ValidationIssue::UnregisteredTool {
                    tool: step.tool_name().to_string(),
                });
                continue;
            };

            let schema = tool.input_schema();
            let Some(declared) = schema.get("properties").and_then(|p| p.as_object()) else {
                continue;
            };
            for param in step.param_mapping().keys() {
                if !declared.contains_key(param) {
                    issues.push(ValidationIssue::UndeclaredParameter {
                        step: step.tool_name().to_string(),
                        param: param.clone(),
                    });
                }
            }
        }

        self.check_issues(issues)
    }

    fn structural_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.is_empty() {
            issues.push(ValidationIssue::EmptySequence);
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        let mut reported: HashSet<&str> = HashSet::new();

        for step in self {
            let name = step.tool_name();

            match step.dependency() {
                Some(dependency) if !earlier.contains(dependency) => {
                    issues.push(ValidationIssue::UnknownDependency {
                        step: name.to_string(),
                        dependency: dependency.to_string(),
                    });
                }
                None if !step.param_mapping().is_empty() => {
                    issues.push(ValidationIssue::MappingWithoutDependency {
                        step: name.to_string(),
                    });
                }
                _ => {}
            }

            for (param, source) in step.param_mapping() {
                for reference in source.referenced_steps() {
                    if !earlier.contains(reference) {
                        issues.push(ValidationIssue::UnknownReference {
                            step: name.to_string(),
                            param: param.clone(),
                            reference: reference.to_string(),
                        });
                    }
                }
            }

            if !earlier.insert(name) && reported.insert(name) {
                issues.push(ValidationIssue::DuplicateTool {
                    tool: name.to_string(),
                });
            }
        }

        issues
    }

    fn check_issues(&self, issues: Vec<ValidationIssue>) -> Result<(), ValidationError> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                sequence: self.name().to_string(),
                issues,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{AggregateField, ParamSource};
    use crate::step::ExecutionStep;
    use serde_json::json;
    use stockflow_tools::FnTool;

    fn noop(name: &str) -> FnTool {
        FnTool::new(name, |_| async { Ok(json!({})) })
    }

    #[test]
    fn test_valid_chain() {
        let sequence = Sequence::builder("ok")
            .step(ExecutionStep::new("a", ""))
            .step(
                ExecutionStep::new("b", "")
                    .depends_on("a")
                    .map_param("x", ParamSource::full_result()),
            )
            .step(
                ExecutionStep::new("c", "")
                    .depends_on("b")
                    .map_param("y", ParamSource::full_result_of("a")),
            )
            .build();
        assert!(sequence.validate().is_ok());
    }

    #[test]
    fn test_empty_sequence() {
        let err = Sequence::new("empty", Vec::new()).validate().unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::EmptySequence]);
        assert_eq!(err.to_string(), "sequence 'empty' is invalid: sequence has no steps");
    }

    #[test]
    fn test_reference_issues() {
        let sequence = Sequence::builder("bad")
            .step(ExecutionStep::new("a", "").depends_on("b"))
            .step(ExecutionStep::new("b", "").map_param("x", ParamSource::key("k")))
            .step(
                ExecutionStep::new("c", "")
                    .depends_on("b")
                    .map_param("y", ParamSource::key_of("z", "k"))
                    .map_param(
                        "all",
                        ParamSource::aggregate(vec![AggregateField::new("later", "d")]),
                    ),
            )
            .step(ExecutionStep::new("d", ""))
            .step(ExecutionStep::new("a", ""))
            .build();

        let issues = sequence.validate().unwrap_err().issues;
        assert_eq!(
            issues,
            vec![
                ValidationIssue::UnknownDependency {
                    step: "a".into(),
                    dependency: "b".into()
                },
                ValidationIssue::MappingWithoutDependency { step: "b".into() },
                ValidationIssue::UnknownReference {
                    step: "c".into(),
                    param: "all".into(),
                    reference: "d".into()
                },
                ValidationIssue::UnknownReference {
                    step: "c".into(),
                    param: "y".into(),
                    reference: "z".into()
                },
                ValidationIssue::DuplicateTool { tool: "a".into() },
            ]
        );
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let sequence = Sequence::builder("self")
            .step(ExecutionStep::new("a", "").depends_on("a"))
            .build();
        assert!(sequence.validate().is_err());
    }

    #[test]
    fn test_validate_against_registry() {
        let registry = ToolRegistry::new().with_tool(noop("a")).with_tool(
            noop("b").with_schema(json!({
                "type": "object",
                "properties": {"financial_data": {"type": "object"}}
            })),
        );

        let sequence = Sequence::builder("s")
            .step(ExecutionStep::new("a", ""))
            .step(
                ExecutionStep::new("b", "")
                    .depends_on("a")
                    .map_param("financial_data", ParamSource::full_result())
                    .map_param("ratios", ParamSource::key("ratios")),
            )
            .step(ExecutionStep::new("missing", "").depends_on("b"))
            .build();

        assert!(sequence.validate().is_ok());
        let issues = sequence.validate_against(&registry).unwrap_err().issues;
        assert_eq!(
            issues,
            vec![
                ValidationIssue::UndeclaredParameter {
                    step: "b".into(),
                    param: "ratios".into()
                },
                ValidationIssue::UnregisteredTool {
                    tool: "missing".into()
                },
            ]
        );
    }
}
