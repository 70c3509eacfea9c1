use std::collections::BTreeMap;

use sotv_core::{
    Enforcement, FieldRef, ConstraintOp, Priority, Rule, RuleKind, RuleTarget, RunId, Severity,
    StructureCheck, ValidationResult,
};

#[test]
fn rule_construction() {
    let rule = Rule {
        rule_id: "STRUCT-001".to_string(),
        kind: RuleKind::Structure,
        severity: Severity::Critical,
        priority: Priority::Must,
        enforcement: Enforcement::Strict,
        target: RuleTarget::Structure(StructureCheck::DirCount {
            path: ".".to_string(),
            expected: 24,
        }),
    };
    assert_eq!(rule.rule_id, "STRUCT-001");
    assert_eq!(rule.kind, RuleKind::Structure);
}

#[test]
fn constraint_target_construction() {
    let target = RuleTarget::Constraint {
        op: ConstraintOp::SumEquals,
        fields: vec![FieldRef {
            file: "shares.yaml".to_string(),
            field_path: "allocations.a".to_string(),
        }],
        expected: 100.0,
        epsilon: 1e-6,
    };
    match target {
        RuleTarget::Constraint { op, fields, .. } => {
            assert_eq!(op, ConstraintOp::SumEquals);
            assert_eq!(fields.len(), 1);
        }
        _ => panic!("expected constraint target"),
    }
}

#[test]
fn blocking_failure_requires_strict_enforcement() {
    let mut r = ValidationResult {
        rule_id: "r".to_string(),
        passed: false,
        severity: Severity::High,
        priority: Priority::Must,
        enforcement: Enforcement::Warn,
        message: String::new(),
        evidence: BTreeMap::new(),
        timestamp_unix: 0,
    };
    assert!(!r.is_blocking_failure());
    r.enforcement = Enforcement::Strict;
    assert!(r.is_blocking_failure());
    r.passed = true;
    assert!(!r.is_blocking_failure());
}

#[test]
fn run_ids_are_unique() {
    assert_ne!(RunId::new(), RunId::new());
}

#[test]
fn validation_result_round_trips_through_json() {
    let mut evidence = BTreeMap::new();
    evidence.insert("error".to_string(), serde_json::json!("PATH_NOT_FOUND"));
    let r = ValidationResult {
        rule_id: "FIELD-007".to_string(),
        passed: false,
        severity: Severity::Medium,
        priority: Priority::Should,
        enforcement: Enforcement::Warn,
        message: "field missing".to_string(),
        evidence,
        timestamp_unix: 1_700_000_000,
    };
    let json = serde_json::to_string(&r).unwrap();
    let back: ValidationResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);
}
