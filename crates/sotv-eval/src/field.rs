use anyhow::bail;
use sotv_core::{Rule, RuleTarget, ValidationResult};
use sotv_tree::{FileTree, Lookup};

use crate::outcome::{Outcome, FILE_NOT_FOUND, PATH_NOT_FOUND};
use crate::path::{as_number, lookup_path};
use crate::Evaluate;

/// Validates that a dotted field path inside a YAML file equals an expected
/// value. Exact equality unless the rule specifies a numeric tolerance.
pub struct FieldEqualityEvaluator;

impl Evaluate for FieldEqualityEvaluator {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult> {
        let (file, field_path, expected, tolerance) = match &rule.target {
            RuleTarget::FieldEquality {
                file,
                field_path,
                expected,
                tolerance,
            } => (file, field_path, expected, tolerance),
            _ => bail!("rule {} target does not match FIELD_EQUALITY", rule.rule_id),
        };

        let doc = match tree.read_yaml(file)? {
            Lookup::Found((doc, _)) => doc,
            Lookup::Missing => {
                return Ok(Outcome::fail(rule, now_unix, format!("{} not found", file))
                    .evidence("file", file.as_str())
                    .evidence("error", FILE_NOT_FOUND)
                    .build());
            }
        };

        let actual = match lookup_path(&doc, field_path) {
            Some(v) => v,
            None => {
                return Ok(Outcome::fail(
                    rule,
                    now_unix,
                    format!("{} has no field {}", file, field_path),
                )
                .evidence("file", file.as_str())
                .evidence("field_path", field_path.as_str())
                .evidence("error", PATH_NOT_FOUND)
                .build());
            }
        };

        let equal = match tolerance {
            Some(tol) => match (as_number(actual), as_number(expected)) {
                (Some(a), Some(e)) => (a - e).abs() <= *tol,
                _ => actual == expected,
            },
            None => actual == expected,
        };

        Ok(if equal {
            Outcome::pass(rule, now_unix, format!("{}:{} matches", file, field_path))
                .evidence("file", file.as_str())
                .evidence("field_path", field_path.as_str())
                .evidence("expected", expected.clone())
                .evidence("actual", actual.clone())
                .build()
        } else {
            Outcome::fail(
                rule,
                now_unix,
                format!("{}:{} does not match expected value", file, field_path),
            )
            .evidence("file", file.as_str())
            .evidence("field_path", field_path.as_str())
            .evidence("expected", expected.clone())
            .evidence("actual", actual.clone())
            .build()
        })
    }
}
