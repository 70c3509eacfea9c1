use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// The declarative unit of validation. Loaded once per run and shared
/// read-only by all evaluators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub kind: RuleKind,
    pub severity: Severity,
    pub priority: Priority,
    pub enforcement: Enforcement,
    pub target: RuleTarget,
}

/// Kind-specific locator plus expectation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum RuleTarget {
    Structure(StructureCheck),
    FieldEquality {
        file: String,
        field_path: String,
        expected: serde_json::Value,
        tolerance: Option<f64>,
    },
    ListEquality {
        file: String,
        field_path: String,
        expected: Vec<serde_json::Value>,
        order: ListOrder,
    },
    LineHash {
        file: String,
        /// 1-based line number in the frozen reference document.
        line: usize,
        expected_hash: String,
    },
    Constraint {
        op: ConstraintOp,
        fields: Vec<FieldRef>,
        expected: f64,
        epsilon: f64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StructureCheck {
    /// The path must exist in the target tree.
    Exists { path: String },
    /// The directory must contain exactly `expected` subdirectories.
    DirCount { path: String, expected: usize },
    /// A file named `name` must exist exactly once across `search_roots`,
    /// and only under `allowed_dir`.
    UniqueFile {
        name: String,
        allowed_dir: String,
        search_roots: Vec<String>,
    },
}

/// Reference to one scalar field inside a YAML document, used by
/// constraint rules spanning multiple fields or files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldRef {
    pub file: String,
    pub field_path: String,
}

/// Output of evaluating one rule against the current file tree.
/// Every rule produces exactly one result per run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub rule_id: String,
    pub passed: bool,
    pub severity: Severity,
    pub priority: Priority,
    pub enforcement: Enforcement,
    pub message: String,
    pub evidence: BTreeMap<String, serde_json::Value>,
    pub timestamp_unix: i64,
}

impl ValidationResult {
    pub fn is_blocking_failure(&self) -> bool {
        !self.passed && self.enforcement == Enforcement::Strict
    }
}

/// Persisted validation memo. Reusable iff every tracked hash still matches
/// the live tree and the entry is within its TTL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub rule_id: String,
    pub result: ValidationResult,
    pub file_hashes: BTreeMap<String, String>,
    pub recorded_at_unix: i64,
}
