use anyhow::bail;
use sotv_core::{ConstraintOp, FieldRef, Rule, RuleTarget, ValidationResult};
use sotv_tree::{FileTree, Lookup};

use crate::outcome::{Outcome, FILE_NOT_FOUND, PATH_NOT_FOUND};
use crate::path::{as_number, lookup_path};
use crate::Evaluate;

/// Cross-field mathematical constraints spanning one or more YAML files:
/// sum-equals, ratio-equals, lte, gte. Numeric comparisons use the rule's
/// epsilon so floating point never produces false negatives.
pub struct ConstraintEvaluator;

impl Evaluate for ConstraintEvaluator {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult> {
        let (op, fields, expected, epsilon) = match &rule.target {
            RuleTarget::Constraint {
                op,
                fields,
                expected,
                epsilon,
            } => (*op, fields, *expected, *epsilon),
            _ => bail!("rule {} target does not match CONSTRAINT", rule.rule_id),
        };

        let mut values = Vec::with_capacity(fields.len());
        let mut resolved = serde_json::Map::new();
        for field in fields {
            match resolve_numeric(tree, field)? {
                Resolved::Value(v) => {
                    values.push(v);
                    resolved.insert(
                        format!("{}:{}", field.file, field.field_path),
                        serde_json::json!(v),
                    );
                }
                Resolved::Failed(marker, message) => {
                    return Ok(Outcome::fail(rule, now_unix, message)
                        .evidence("file", field.file.as_str())
                        .evidence("field_path", field.field_path.as_str())
                        .evidence("error", marker)
                        .build());
                }
            }
        }

        let (actual, description) = match op {
            ConstraintOp::SumEquals => (values.iter().sum::<f64>(), "sum"),
            ConstraintOp::RatioEquals => {
                // Arity checked at load time.
                if values[1] == 0.0 {
                    return Ok(Outcome::fail(rule, now_unix, "ratio denominator is zero")
                        .evidence("resolved", serde_json::Value::Object(resolved))
                        .evidence("error", "DIVISION_BY_ZERO")
                        .build());
                }
                (values[0] / values[1], "ratio")
            }
            ConstraintOp::Lte => (values[0], "value"),
            ConstraintOp::Gte => (values[0], "value"),
        };

        let holds = match op {
            ConstraintOp::SumEquals | ConstraintOp::RatioEquals => {
                (actual - expected).abs() <= epsilon
            }
            ConstraintOp::Lte => actual <= expected + epsilon,
            ConstraintOp::Gte => actual >= expected - epsilon,
        };

        let op_name = match op {
            ConstraintOp::SumEquals => "sum_equals",
            ConstraintOp::RatioEquals => "ratio_equals",
            ConstraintOp::Lte => "lte",
            ConstraintOp::Gte => "gte",
        };

        let outcome = if holds {
            Outcome::pass(
                rule,
                now_unix,
                format!("{} constraint holds ({} = {})", op_name, description, actual),
            )
        } else {
            Outcome::fail(
                rule,
                now_unix,
                format!(
                    "{} constraint violated ({} = {}, expected {})",
                    op_name, description, actual, expected
                ),
            )
        };
        Ok(outcome
            .evidence("op", op_name)
            .evidence("resolved", serde_json::Value::Object(resolved))
            .evidence("expected", expected)
            .evidence("actual", actual)
            .build())
    }
}

enum Resolved {
    Value(f64),
    Failed(&'static str, String),
}

fn resolve_numeric(tree: &FileTree, field: &FieldRef) -> anyhow::Result<Resolved> {
    let doc = match tree.read_yaml(&field.file)? {
        Lookup::Found((doc, _)) => doc,
        Lookup::Missing => {
            return Ok(Resolved::Failed(
                FILE_NOT_FOUND,
                format!("{} not found", field.file),
            ));
        }
    };
    let value = match lookup_path(&doc, &field.field_path) {
        Some(v) => v,
        None => {
            return Ok(Resolved::Failed(
                PATH_NOT_FOUND,
                format!("{} has no field {}", field.file, field.field_path),
            ));
        }
    };
    match as_number(value) {
        Some(v) => Ok(Resolved::Value(v)),
        None => Ok(Resolved::Failed(
            "NOT_NUMERIC",
            format!("{}:{} is not numeric", field.file, field.field_path),
        )),
    }
}
