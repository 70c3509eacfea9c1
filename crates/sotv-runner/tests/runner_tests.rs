use std::collections::BTreeMap;
use std::path::Path;

use sotv_cache::{InMemoryCache, ResultCache};
use sotv_catalog::{parse_catalog_str, SourceFormat};
use sotv_core::{CacheEntry, Priority, RunError, ValidationResult};
use sotv_report::NullSink;
use sotv_runner::{now_unix, Options, RunFilter, Runner};
use sotv_tree::FileTree;
use tempfile::{tempdir, TempDir};

const CATALOG: &str = r#"
rules:
  - rule_id: VERSION-OK
    kind: FIELD_EQUALITY
    severity: HIGH
    priority: MUST
    enforcement: strict
    file: app.yaml
    field_path: version
    expected: "2.1"
  - rule_id: REGIONS-SET
    kind: LIST_EQUALITY
    severity: MEDIUM
    priority: SHOULD
    enforcement: warn
    file: app.yaml
    field_path: regions
    expected: [eu, us]
  - rule_id: SHARES-SUM
    kind: CONSTRAINT
    severity: CRITICAL
    priority: MUST
    op: sum_equals
    expected: 100
    fields:
      - { file: shares.yaml, field_path: a }
      - { file: shares.yaml, field_path: b }
  - rule_id: CONFIG-EXISTS
    kind: STRUCTURE
    severity: LOW
    priority: HAVE
    enforcement: info
    check: exists
    path: app.yaml
"#;

fn write_target(dir: &Path) {
    std::fs::write(
        dir.join("app.yaml"),
        "version: \"2.1\"\nregions:\n  - us\n  - eu\n",
    )
    .unwrap();
    std::fs::write(dir.join("shares.yaml"), "a: 60\nb: 40\n").unwrap();
}

fn runner_with(dir: &TempDir, options: Options, cache: Box<dyn ResultCache>) -> Runner {
    let catalog = parse_catalog_str("catalog.yaml", CATALOG, SourceFormat::Yaml).unwrap();
    Runner::new(
        options,
        catalog,
        FileTree::new(dir.path()),
        cache,
        Box::new(NullSink),
    )
}

fn runner(dir: &TempDir) -> Runner {
    runner_with(dir, Options::default_for_repo(), Box::new(InMemoryCache::new()))
}

fn rule_ids(results: &[ValidationResult]) -> Vec<&str> {
    results.iter().map(|r| r.rule_id.as_str()).collect()
}

#[test]
fn full_run_passes_and_preserves_catalog_order() {
    let dir = tempdir().unwrap();
    write_target(dir.path());

    let report = runner(&dir).run(&RunFilter::all(), None).unwrap();
    assert_eq!(
        rule_ids(&report.results),
        vec!["VERSION-OK", "REGIONS-SET", "SHARES-SUM", "CONFIG-EXISTS"]
    );
    assert!(report.scorecard.passed);
    assert_eq!(report.scorecard.weighted_score, 100.0);
    assert_eq!(report.scorecard.must.total, 2);
    assert_eq!(report.scorecard.should.total, 1);
    assert_eq!(report.scorecard.have.total, 1);
}

#[test]
fn parallel_run_emits_identical_order() {
    let dir = tempdir().unwrap();
    write_target(dir.path());

    let mut options = Options::default_for_repo();
    options.parallelism = 4;
    let report = runner_with(&dir, options, Box::new(InMemoryCache::new()))
        .run(&RunFilter::all(), None)
        .unwrap();
    assert_eq!(
        rule_ids(&report.results),
        vec!["VERSION-OK", "REGIONS-SET", "SHARES-SUM", "CONFIG-EXISTS"]
    );
    assert!(report.scorecard.passed);
}

#[test]
fn fresh_cache_entry_is_returned_verbatim() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    let tree = FileTree::new(dir.path());
    let hash = tree.tracked_hash("app.yaml").unwrap();
    let now = now_unix();

    let memoized = ValidationResult {
        rule_id: "VERSION-OK".into(),
        passed: true,
        severity: sotv_core::Severity::High,
        priority: Priority::Must,
        enforcement: sotv_core::Enforcement::Strict,
        message: "memoized".into(),
        evidence: BTreeMap::new(),
        timestamp_unix: now - 100,
    };
    let cache = InMemoryCache::new();
    cache.put(CacheEntry {
        rule_id: "VERSION-OK".into(),
        result: memoized,
        file_hashes: BTreeMap::from([("app.yaml".to_string(), hash)]),
        recorded_at_unix: now - 100,
    });

    let report = runner_with(&dir, Options::default_for_repo(), Box::new(cache))
        .run(&RunFilter::all(), None)
        .unwrap();
    let r = &report.results[0];
    assert_eq!(r.message, "memoized");
    assert_eq!(r.timestamp_unix, now - 100);
}

#[test]
fn byte_change_invalidates_the_cached_verdict() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    let tree = FileTree::new(dir.path());
    let stale_hash = tree.tracked_hash("app.yaml").unwrap();
    let now = now_unix();

    // Entry recorded against the old bytes, claiming a pass that is no
    // longer true once the file changes.
    let cache = InMemoryCache::new();
    cache.put(CacheEntry {
        rule_id: "VERSION-OK".into(),
        result: ValidationResult {
            rule_id: "VERSION-OK".into(),
            passed: true,
            severity: sotv_core::Severity::High,
            priority: Priority::Must,
            enforcement: sotv_core::Enforcement::Strict,
            message: "stale".into(),
            evidence: BTreeMap::new(),
            timestamp_unix: now,
        },
        file_hashes: BTreeMap::from([("app.yaml".to_string(), stale_hash)]),
        recorded_at_unix: now,
    });

    std::fs::write(dir.path().join("app.yaml"), "version: \"9.9\"\nregions: [eu, us]\n").unwrap();
    let filter = RunFilter {
        rule_id: Some("VERSION-OK".into()),
        priority: None,
    };
    let report = runner_with(&dir, Options::default_for_repo(), Box::new(cache))
        .run(&filter, None)
        .unwrap();
    assert_eq!(report.results.len(), 1);
    assert!(!report.results[0].passed);
    assert_ne!(report.results[0].message, "stale");
}

#[test]
fn malformed_target_file_does_not_poison_other_rules() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    std::fs::write(dir.path().join("shares.yaml"), "a: [broken\n  b: }{").unwrap();

    let report = runner(&dir).run(&RunFilter::all(), None).unwrap();
    assert_eq!(report.results.len(), 4);
    let sum = report
        .results
        .iter()
        .find(|r| r.rule_id == "SHARES-SUM")
        .unwrap();
    assert!(!sum.passed);
    assert!(sum.severity >= sotv_core::Severity::High);
    assert!(report.results.iter().any(|r| r.rule_id == "VERSION-OK" && r.passed));
}

#[test]
fn blocking_failure_fails_the_run() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    std::fs::write(dir.path().join("shares.yaml"), "a: 61\nb: 40\n").unwrap();

    let report = runner(&dir).run(&RunFilter::all(), None).unwrap();
    assert_eq!(report.scorecard.blocking_failures, 1);
    assert!(!report.scorecard.passed);
    assert!(report.scorecard.weighted_score < 100.0);
}

#[test]
fn priority_filter_narrows_the_run() {
    let dir = tempdir().unwrap();
    write_target(dir.path());

    let filter = RunFilter {
        rule_id: None,
        priority: Some(Priority::Must),
    };
    let report = runner(&dir).run(&filter, None).unwrap();
    assert_eq!(rule_ids(&report.results), vec!["VERSION-OK", "SHARES-SUM"]);
    assert_eq!(report.scorecard.should.total, 0);
}

#[test]
fn unknown_rule_id_is_an_error_not_a_clean_pass() {
    let dir = tempdir().unwrap();
    write_target(dir.path());

    let filter = RunFilter {
        rule_id: Some("TYPO-ID".into()),
        priority: None,
    };
    let err = runner(&dir).run(&filter, None).unwrap_err();
    match err.downcast::<RunError>().unwrap() {
        RunError::NoRulesMatched { filter } => assert!(filter.contains("TYPO-ID")),
        other => panic!("expected NoRulesMatched, got {:?}", other),
    }
}

#[test]
fn unrestricted_run_over_empty_catalog_still_scores() {
    let dir = tempdir().unwrap();
    let catalog = parse_catalog_str("empty.yaml", "rules: []\n", SourceFormat::Yaml).unwrap();
    let runner = Runner::new(
        Options::default_for_repo(),
        catalog,
        FileTree::new(dir.path()),
        Box::new(InMemoryCache::new()),
        Box::new(NullSink),
    );

    // Nothing to hold against an empty catalog; only a filter that misses
    // every rule is suspicious.
    let report = runner.run(&RunFilter::all(), None).unwrap();
    assert!(report.results.is_empty());
    assert!(report.scorecard.passed);
}

#[test]
fn expired_deadline_yields_incomplete_without_scorecard() {
    let dir = tempdir().unwrap();
    write_target(dir.path());

    let err = runner(&dir)
        .run(&RunFilter::all(), Some(now_unix() - 10))
        .unwrap_err();
    match err.downcast::<RunError>().unwrap() {
        RunError::Incomplete {
            evaluated,
            total,
            partial,
            ..
        } => {
            assert_eq!(evaluated, 0);
            assert_eq!(total, 4);
            assert!(partial.is_empty());
        }
        other => panic!("expected Incomplete, got {:?}", other),
    }
}

#[test]
fn fail_fast_skips_rules_after_a_blocking_failure() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    // First rule fails strict.
    std::fs::write(dir.path().join("app.yaml"), "version: \"0.0\"\nregions: [eu, us]\n").unwrap();

    let mut options = Options::default_for_repo();
    options.fail_fast = true;
    let err = runner_with(&dir, options, Box::new(InMemoryCache::new()))
        .run(&RunFilter::all(), None)
        .unwrap_err();
    match err.downcast::<RunError>().unwrap() {
        RunError::Incomplete {
            evaluated,
            total,
            reason,
            partial,
        } => {
            assert_eq!(evaluated, 1);
            assert_eq!(total, 4);
            assert!(reason.contains("fail-fast"));
            assert_eq!(partial[0].rule_id, "VERSION-OK");
            assert!(!partial[0].passed);
        }
        other => panic!("expected Incomplete, got {:?}", other),
    }
}

#[test]
fn open_wires_defaults_when_no_config_file_exists() {
    let dir = tempdir().unwrap();
    write_target(dir.path());
    std::fs::write(dir.path().join("catalog.yaml"), CATALOG).unwrap();

    let runner = Runner::open(dir.path(), None).unwrap();
    assert_eq!(runner.catalog().len(), 4);
    let report = runner.run(&RunFilter::all(), None).unwrap();
    assert!(report.scorecard.passed);
    // The durable cache landed at the default location.
    assert!(dir.path().join(".sotv/cache.json").exists());
}
