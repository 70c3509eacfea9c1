use anyhow::bail;
use sotv_core::{Rule, RuleTarget, StructureCheck, ValidationResult};
use sotv_tree::{FileTree, Lookup};

use crate::outcome::{Outcome, DIR_NOT_FOUND};
use crate::Evaluate;

/// Validates directory/file existence and counts against the target tree.
pub struct StructureEvaluator;

impl Evaluate for StructureEvaluator {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult> {
        let check = match &rule.target {
            RuleTarget::Structure(check) => check,
            _ => bail!("rule {} target does not match STRUCTURE", rule.rule_id),
        };

        Ok(match check {
            StructureCheck::Exists { path } => {
                if tree.exists(path) {
                    Outcome::pass(rule, now_unix, format!("{} exists", path))
                        .evidence("path", path.as_str())
                        .build()
                } else {
                    Outcome::fail(rule, now_unix, format!("{} does not exist", path))
                        .evidence("path", path.as_str())
                        .evidence("error", crate::outcome::FILE_NOT_FOUND)
                        .build()
                }
            }
            StructureCheck::DirCount { path, expected } => match tree.list_subdirs(path)? {
                Lookup::Missing => Outcome::fail(
                    rule,
                    now_unix,
                    format!("directory {} does not exist", path),
                )
                .evidence("path", path.as_str())
                .evidence("error", DIR_NOT_FOUND)
                .build(),
                Lookup::Found(dirs) => {
                    let actual = dirs.len();
                    if actual == *expected {
                        Outcome::pass(
                            rule,
                            now_unix,
                            format!("{} contains {} subdirectories", path, actual),
                        )
                        .evidence("path", path.as_str())
                        .evidence("expected", *expected as u64)
                        .evidence("actual", actual as u64)
                        .build()
                    } else {
                        Outcome::fail(
                            rule,
                            now_unix,
                            format!(
                                "{} contains {} subdirectories, expected {}",
                                path, actual, expected
                            ),
                        )
                        .evidence("path", path.as_str())
                        .evidence("expected", *expected as u64)
                        .evidence("actual", actual as u64)
                        .build()
                    }
                }
            },
            StructureCheck::UniqueFile {
                name,
                allowed_dir,
                search_roots,
            } => unique_file(rule, tree, now_unix, name, allowed_dir, search_roots)?,
        })
    }
}

/// A unique-file rule fails when the file is absent, duplicated, or present
/// only in a disallowed location. Mere presence somewhere is not enough.
fn unique_file(
    rule: &Rule,
    tree: &FileTree,
    now_unix: i64,
    name: &str,
    allowed_dir: &str,
    search_roots: &[String],
) -> anyhow::Result<ValidationResult> {
    let mut matches: Vec<String> = Vec::new();
    for root in search_roots {
        if let Lookup::Found(files) = tree.walk_files(root)? {
            for rel in files {
                let file_name = rel.rsplit('/').next().unwrap_or(rel.as_str());
                if file_name == name {
                    matches.push(join_rel(root, &rel));
                }
            }
        }
    }
    matches.sort();

    let locations = serde_json::json!(matches.clone());
    if matches.is_empty() {
        return Ok(Outcome::fail(rule, now_unix, format!("{} not found", name))
            .evidence("name", name)
            .evidence("error", crate::outcome::FILE_NOT_FOUND)
            .build());
    }
    if matches.len() > 1 {
        return Ok(Outcome::fail(
            rule,
            now_unix,
            format!("{} found in {} locations, expected one", name, matches.len()),
        )
        .evidence("name", name)
        .evidence("locations", locations)
        .build());
    }

    let location = &matches[0];
    let parent = location.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let allowed = allowed_dir.trim_end_matches('/');
    if parent == allowed {
        Ok(
            Outcome::pass(rule, now_unix, format!("{} unique under {}", name, allowed))
                .evidence("name", name)
                .evidence("locations", locations)
                .build(),
        )
    } else {
        Ok(Outcome::fail(
            rule,
            now_unix,
            format!("{} found under {}, expected {}", name, parent, allowed),
        )
        .evidence("name", name)
        .evidence("locations", locations)
        .evidence("allowed_dir", allowed)
        .build())
    }
}

fn join_rel(root: &str, rel: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() || root == "." {
        rel.to_string()
    } else {
        format!("{}/{}", root, rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate_rule;
    use sotv_core::{Enforcement, Priority, RuleKind, Severity};
    use tempfile::tempdir;

    fn rule(check: StructureCheck) -> Rule {
        Rule {
            rule_id: "S-1".into(),
            kind: RuleKind::Structure,
            severity: Severity::Critical,
            priority: Priority::Must,
            enforcement: Enforcement::Strict,
            target: RuleTarget::Structure(check),
        }
    }

    #[test]
    fn dir_count_pass_and_fail() {
        let dir = tempdir().unwrap();
        for i in 0..24 {
            std::fs::create_dir(dir.path().join(format!("d{:02}", i))).unwrap();
        }
        let tree = FileTree::new(dir.path());
        let r = evaluate_rule(
            &rule(StructureCheck::DirCount {
                path: ".".into(),
                expected: 24,
            }),
            &tree,
            0,
        );
        assert!(r.passed);

        std::fs::remove_dir(dir.path().join("d00")).unwrap();
        // Fresh tree: the first one holds its per-run snapshot.
        let tree = FileTree::new(dir.path());
        let r = evaluate_rule(
            &rule(StructureCheck::DirCount {
                path: ".".into(),
                expected: 24,
            }),
            &tree,
            0,
        );
        assert!(!r.passed);
        assert_eq!(r.evidence["actual"], serde_json::json!(23));
    }

    #[test]
    fn exists_check() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("present.yaml"), "x: 1").unwrap();
        let tree = FileTree::new(dir.path());

        assert!(evaluate_rule(
            &rule(StructureCheck::Exists {
                path: "present.yaml".into()
            }),
            &tree,
            0
        )
        .passed);
        assert!(!evaluate_rule(
            &rule(StructureCheck::Exists {
                path: "absent.yaml".into()
            }),
            &tree,
            0
        )
        .passed);
    }

    #[test]
    fn unique_file_fails_on_duplicate_locations() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::create_dir_all(dir.path().join("legacy")).unwrap();
        std::fs::write(dir.path().join("docs/charter.md"), "a").unwrap();
        std::fs::write(dir.path().join("legacy/charter.md"), "b").unwrap();
        let tree = FileTree::new(dir.path());

        let r = evaluate_rule(
            &rule(StructureCheck::UniqueFile {
                name: "charter.md".into(),
                allowed_dir: "docs".into(),
                search_roots: vec![".".into()],
            }),
            &tree,
            0,
        );
        assert!(!r.passed);
        assert!(r.message.contains("2 locations"));
    }

    #[test]
    fn unique_file_fails_when_only_in_wrong_place() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("legacy")).unwrap();
        std::fs::write(dir.path().join("legacy/charter.md"), "b").unwrap();
        let tree = FileTree::new(dir.path());

        let r = evaluate_rule(
            &rule(StructureCheck::UniqueFile {
                name: "charter.md".into(),
                allowed_dir: "docs".into(),
                search_roots: vec![".".into()],
            }),
            &tree,
            0,
        );
        assert!(!r.passed);
        assert_eq!(r.evidence["allowed_dir"], serde_json::json!("docs"));
    }

    #[test]
    fn unique_file_passes_in_allowed_dir() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/charter.md"), "a").unwrap();
        let tree = FileTree::new(dir.path());

        let r = evaluate_rule(
            &rule(StructureCheck::UniqueFile {
                name: "charter.md".into(),
                allowed_dir: "docs".into(),
                search_roots: vec![".".into()],
            }),
            &tree,
            0,
        );
        assert!(r.passed);
    }
}
