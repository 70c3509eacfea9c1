use anyhow::bail;
use sotv_core::{Rule, RuleTarget, ValidationResult};
use sotv_tree::{sha256_hex, FileTree, Lookup};

use crate::outcome::{Outcome, FILE_NOT_FOUND, LINE_NOT_FOUND};
use crate::Evaluate;

/// Byte-exact drift detection against a frozen reference: hashes one line
/// (1-based) of a file and compares against the stored hash. Intentionally
/// insensitive to semantic meaning.
pub struct LineHashEvaluator;

impl Evaluate for LineHashEvaluator {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult> {
        let (file, line, expected_hash) = match &rule.target {
            RuleTarget::LineHash {
                file,
                line,
                expected_hash,
            } => (file, *line, expected_hash),
            _ => bail!("rule {} target does not match LINE_HASH", rule.rule_id),
        };

        let lines = match tree.read_lines(file)? {
            Lookup::Found((lines, _)) => lines,
            Lookup::Missing => {
                return Ok(Outcome::fail(rule, now_unix, format!("{} not found", file))
                    .evidence("file", file.as_str())
                    .evidence("error", FILE_NOT_FOUND)
                    .build());
            }
        };

        if line == 0 || line > lines.len() {
            return Ok(Outcome::fail(
                rule,
                now_unix,
                format!("{} has {} lines, rule references line {}", file, lines.len(), line),
            )
            .evidence("file", file.as_str())
            .evidence("line", line as u64)
            .evidence("line_count", lines.len() as u64)
            .evidence("error", LINE_NOT_FOUND)
            .build());
        }

        let actual_hash = sha256_hex(&lines[line - 1]);
        Ok(if actual_hash.eq_ignore_ascii_case(expected_hash) {
            Outcome::pass(rule, now_unix, format!("{}:{} matches reference", file, line))
                .evidence("file", file.as_str())
                .evidence("line", line as u64)
                .evidence("expected_hash", expected_hash.as_str())
                .evidence("actual_hash", actual_hash)
                .build()
        } else {
            Outcome::fail(
                rule,
                now_unix,
                format!("{}:{} drifted from frozen reference", file, line),
            )
            .evidence("file", file.as_str())
            .evidence("line", line as u64)
            .evidence("expected_hash", expected_hash.as_str())
            .evidence("actual_hash", actual_hash)
            .build()
        })
    }
}
