pub mod constraint;
pub mod field;
pub mod line_hash;
pub mod list;
pub mod outcome;
pub mod path;
pub mod structure;

pub use outcome::*;

use sotv_core::{Rule, RuleKind, RuleTarget, Severity, StructureCheck, ValidationResult};
use sotv_tree::FileTree;

/// One evaluator per rule kind. Evaluators are stateless and share the
/// file tree read-only; a returned `Err` signals an unexpected fault (e.g.
/// malformed YAML), which [`evaluate_rule`] contains.
pub trait Evaluate: Send + Sync {
    fn evaluate(
        &self,
        rule: &Rule,
        tree: &FileTree,
        now_unix: i64,
    ) -> anyhow::Result<ValidationResult>;
}

pub fn evaluator_for(kind: RuleKind) -> &'static dyn Evaluate {
    match kind {
        RuleKind::Structure => &structure::StructureEvaluator,
        RuleKind::FieldEquality => &field::FieldEqualityEvaluator,
        RuleKind::ListEquality => &list::ListEqualityEvaluator,
        RuleKind::LineHash => &line_hash::LineHashEvaluator,
        RuleKind::Constraint => &constraint::ConstraintEvaluator,
    }
}

/// Evaluate one rule with fault containment: an unexpected error never
/// aborts the run. It becomes a failing result with severity escalated to
/// at least HIGH and the error description as evidence.
pub fn evaluate_rule(rule: &Rule, tree: &FileTree, now_unix: i64) -> ValidationResult {
    match evaluator_for(rule.kind).evaluate(rule, tree, now_unix) {
        Ok(result) => result,
        Err(e) => {
            let mut result = Outcome::fail(rule, now_unix, "evaluation error")
                .evidence("error", format!("{:#}", e))
                .build();
            result.severity = rule.severity.max(Severity::High);
            result
        }
    }
}

/// Paths whose live hashes a cached result for this rule must be checked
/// against. Directories are tracked by listing shape (see
/// [`FileTree::tracked_hash`]).
pub fn tracked_files(rule: &Rule) -> Vec<String> {
    match &rule.target {
        RuleTarget::Structure(check) => match check {
            StructureCheck::Exists { path } => vec![path.clone()],
            StructureCheck::DirCount { path, .. } => vec![path.clone()],
            StructureCheck::UniqueFile { search_roots, .. } => search_roots.clone(),
        },
        RuleTarget::FieldEquality { file, .. } => vec![file.clone()],
        RuleTarget::ListEquality { file, .. } => vec![file.clone()],
        RuleTarget::LineHash { file, .. } => vec![file.clone()],
        RuleTarget::Constraint { fields, .. } => {
            let mut files: Vec<String> = fields.iter().map(|f| f.file.clone()).collect();
            files.sort();
            files.dedup();
            files
        }
    }
}
