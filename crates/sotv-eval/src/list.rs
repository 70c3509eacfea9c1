use anyhow::bail;
use sotv_core::{ListOrder, Rule, RuleTarget, ValidationResult};
use sotv_tree::{FileTree, Lookup};

use crate::outcome::{Outcome, FILE_NOT_FOUND, PATH_NOT_FOUND};
use crate::path::lookup_path;
use crate::Evaluate;

/// Validates that a field holds an expected sequence, either order-sensitive
/// or as set equality depending on the rule's comparison mode.
pub struct ListEqualityEvaluator;

impl Evaluate for ListEqualityEvaluator {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult> {
        let (file, field_path, expected, order) = match &rule.target {
            RuleTarget::ListEquality {
                file,
                field_path,
                expected,
                order,
            } => (file, field_path, expected, *order),
            _ => bail!("rule {} target does not match LIST_EQUALITY", rule.rule_id),
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
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(other) => {
                return Ok(Outcome::fail(
                    rule,
                    now_unix,
                    format!("{}:{} is not a sequence", file, field_path),
                )
                .evidence("file", file.as_str())
                .evidence("field_path", field_path.as_str())
                .evidence("actual", other.clone())
                .evidence("error", "NOT_A_LIST")
                .build());
            }
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

        let equal = match order {
            ListOrder::Ordered => &actual == expected,
            ListOrder::Unordered => set_equal(&actual, expected),
        };

        let mode = match order {
            ListOrder::Ordered => "ordered",
            ListOrder::Unordered => "unordered",
        };

        Ok(if equal {
            Outcome::pass(rule, now_unix, format!("{}:{} matches list", file, field_path))
                .evidence("file", file.as_str())
                .evidence("field_path", field_path.as_str())
                .evidence("mode", mode)
                .evidence("expected", serde_json::Value::Array(expected.clone()))
                .evidence("actual", serde_json::Value::Array(actual))
                .build()
        } else {
            Outcome::fail(
                rule,
                now_unix,
                format!("{}:{} list does not match ({})", file, field_path, mode),
            )
            .evidence("file", file.as_str())
            .evidence("field_path", field_path.as_str())
            .evidence("mode", mode)
            .evidence("expected", serde_json::Value::Array(expected.clone()))
            .evidence("actual", serde_json::Value::Array(actual))
            .build()
        })
    }
}

/// Multiset equality: duplicates count, order does not. Elements compare by
/// canonical serialization so heterogeneous values work.
fn set_equal(a: &[serde_json::Value], b: &[serde_json::Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let key = |v: &serde_json::Value| serde_json::to_string(v).unwrap_or_default();
    let mut ka: Vec<String> = a.iter().map(key).collect();
    let mut kb: Vec<String> = b.iter().map(key).collect();
    ka.sort();
    kb.sort();
    ka == kb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate_rule;
    use sotv_core::{Enforcement, Priority, RuleKind, Severity};
    use tempfile::tempdir;

    fn rule(expected: Vec<serde_json::Value>, order: ListOrder) -> Rule {
        Rule {
            rule_id: "L-1".into(),
            kind: RuleKind::ListEquality,
            severity: Severity::Medium,
            priority: Priority::Should,
            enforcement: Enforcement::Warn,
            target: RuleTarget::ListEquality {
                file: "a.yaml".into(),
                field_path: "jurisdictions".into(),
                expected,
                order,
            },
        }
    }

    fn tree_with(content: &str) -> (tempfile::TempDir, FileTree) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), content).unwrap();
        let tree = FileTree::new(dir.path());
        (dir, tree)
    }

    #[test]
    fn unordered_comparison_ignores_order() {
        let (_d, tree) = tree_with("jurisdictions: [fr, de, ch]\n");
        let expected = vec![
            serde_json::json!("de"),
            serde_json::json!("fr"),
            serde_json::json!("ch"),
        ];
        let r = evaluate_rule(&rule(expected, ListOrder::Unordered), &tree, 0);
        assert!(r.passed);
    }

    #[test]
    fn ordered_comparison_respects_order() {
        let (_d, tree) = tree_with("jurisdictions: [fr, de, ch]\n");
        let expected = vec![
            serde_json::json!("de"),
            serde_json::json!("fr"),
            serde_json::json!("ch"),
        ];
        let r = evaluate_rule(&rule(expected, ListOrder::Ordered), &tree, 0);
        assert!(!r.passed);
    }

    #[test]
    fn duplicates_matter_even_unordered() {
        let (_d, tree) = tree_with("jurisdictions: [de, de, fr]\n");
        let expected = vec![
            serde_json::json!("de"),
            serde_json::json!("fr"),
            serde_json::json!("fr"),
        ];
        let r = evaluate_rule(&rule(expected, ListOrder::Unordered), &tree, 0);
        assert!(!r.passed);
    }

    #[test]
    fn non_sequence_field_fails() {
        let (_d, tree) = tree_with("jurisdictions: all\n");
        let r = evaluate_rule(
            &rule(vec![serde_json::json!("de")], ListOrder::Unordered),
            &tree,
            0,
        );
        assert!(!r.passed);
        assert_eq!(r.evidence["error"], serde_json::json!("NOT_A_LIST"));
    }
}
