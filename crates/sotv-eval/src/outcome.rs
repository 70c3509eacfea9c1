use std::collections::BTreeMap;

use sotv_core::{Rule, ValidationResult};

/// Builder for the single result a rule produces. Keeps evaluators free of
/// struct-literal noise and guarantees rule metadata is copied consistently.
pub struct Outcome {
    result: ValidationResult,
}

impl Outcome {
    pub fn pass(rule: &Rule, now_unix: i64, message: impl Into<String>) -> Self {
        Self::new(rule, now_unix, true, message)
    }

    pub fn fail(rule: &Rule, now_unix: i64, message: impl Into<String>) -> Self {
        Self::new(rule, now_unix, false, message)
    }

    fn new(rule: &Rule, now_unix: i64, passed: bool, message: impl Into<String>) -> Self {
        Self {
            result: ValidationResult {
                rule_id: rule.rule_id.clone(),
                passed,
                severity: rule.severity,
                priority: rule.priority,
                enforcement: rule.enforcement,
                message: message.into(),
                evidence: BTreeMap::new(),
                timestamp_unix: now_unix,
            },
        }
    }

    pub fn evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.result.evidence.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ValidationResult {
        self.result
    }
}

/// Evidence marker values shared across evaluators.
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
pub const PATH_NOT_FOUND: &str = "PATH_NOT_FOUND";
pub const DIR_NOT_FOUND: &str = "DIR_NOT_FOUND";
pub const LINE_NOT_FOUND: &str = "LINE_NOT_FOUND";
