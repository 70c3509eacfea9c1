use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sotv_core::{
    sort_json, CatalogIssue, CatalogLoadError, ConstraintOp, Enforcement, FieldRef, ListOrder,
    Priority, Rule, RuleKind, RuleTarget, Severity, StructureCheck,
};

/// Immutable rule catalog for one run, with a canonical content hash so
/// reports can state exactly which catalog they were produced against.
#[derive(Clone, Debug)]
pub struct Catalog {
    pub rules: Vec<Rule>,
    pub catalog_hash: String,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    rules: Vec<RawRule>,
}

/// Permissive source shape; per-kind requirements are enforced afterwards so
/// every malformed rule can be reported, not just the first.
#[derive(Clone, Debug, Default, Deserialize)]
struct RawRule {
    rule_id: Option<String>,
    kind: Option<String>,
    severity: Option<String>,
    priority: Option<String>,
    enforcement: Option<String>,

    // STRUCTURE
    check: Option<String>,
    path: Option<String>,
    expected_count: Option<usize>,
    name: Option<String>,
    allowed_dir: Option<String>,
    search_roots: Option<Vec<String>>,

    // FIELD_EQUALITY / LIST_EQUALITY
    file: Option<String>,
    field_path: Option<String>,
    expected: Option<serde_json::Value>,
    tolerance: Option<f64>,
    order: Option<String>,

    // LINE_HASH
    line: Option<usize>,
    expected_hash: Option<String>,

    // CONSTRAINT
    op: Option<String>,
    fields: Option<Vec<RawFieldRef>>,
    epsilon: Option<f64>,

    /// List-rule expansion: one declaration becomes one rule per item, with
    /// derived ids `<rule_id>_001..N` and `{item}` substituted in targets.
    for_each: Option<Vec<serde_json::Value>>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawFieldRef {
    file: Option<String>,
    field_path: Option<String>,
}

/// Load a catalog from a YAML/JSON file, or from every `.yaml`/`.yml`/
/// `.json` file directly under a directory (sorted by name). Pure parse:
/// no side effects. All-or-nothing per source with an exhaustive issue list.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let sources = collect_sources(path)?;
    if sources.is_empty() {
        return Err(anyhow!("no catalog sources under {}", path.display()));
    }

    let mut raws: Vec<(String, usize, RawRule)> = Vec::new();
    let mut issues: Vec<CatalogIssue> = Vec::new();

    for source in &sources {
        let text = std::fs::read_to_string(source)
            .with_context(|| format!("read catalog {}", source.display()))?;
        let fmt = format_for(source);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.display().to_string());
        match parse_raw(&text, fmt) {
            Ok(raw) => {
                for (idx, rule) in raw.rules.into_iter().enumerate() {
                    raws.push((name.clone(), idx, rule));
                }
            }
            Err(e) => issues.push(CatalogIssue {
                rule_ref: name,
                detail: format!("unparseable catalog document: {}", e),
            }),
        }
    }

    let rules = build_rules(raws, &mut issues);

    if !issues.is_empty() {
        return Err(CatalogLoadError {
            source_path: path.display().to_string(),
            issues,
        }
        .into());
    }

    let catalog_hash = catalog_hash(&rules);
    Ok(Catalog { rules, catalog_hash })
}

/// Parse a single in-memory document. Used by tests and by callers that
/// already hold catalog text.
pub fn parse_catalog_str(source_name: &str, text: &str, fmt: SourceFormat) -> Result<Catalog> {
    let mut issues: Vec<CatalogIssue> = Vec::new();
    let raws = match parse_raw(text, fmt) {
        Ok(raw) => raw
            .rules
            .into_iter()
            .enumerate()
            .map(|(idx, r)| (source_name.to_string(), idx, r))
            .collect(),
        Err(e) => {
            issues.push(CatalogIssue {
                rule_ref: source_name.to_string(),
                detail: format!("unparseable catalog document: {}", e),
            });
            Vec::new()
        }
    };
    let rules = build_rules(raws, &mut issues);
    if !issues.is_empty() {
        return Err(CatalogLoadError {
            source_path: source_name.to_string(),
            issues,
        }
        .into());
    }
    let catalog_hash = catalog_hash(&rules);
    Ok(Catalog { rules, catalog_hash })
}

/// Canonical catalog hash: sorted-key JSON of the rule list, SHA-256, hex.
pub fn catalog_hash(rules: &[Rule]) -> String {
    let v = serde_json::to_value(rules).expect("rules serializable");
    let bytes = serde_json::to_vec(&sort_json(v)).expect("json bytes");
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn collect_sources(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("list catalog dir {}", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml") | Some("json")
                    )
            })
            .collect();
        files.sort();
        Ok(files)
    } else if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(anyhow!("catalog path not found: {}", path.display()))
    }
}

fn format_for(path: &Path) -> SourceFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => SourceFormat::Json,
        _ => SourceFormat::Yaml,
    }
}

fn parse_raw(text: &str, fmt: SourceFormat) -> Result<RawCatalog> {
    Ok(match fmt {
        SourceFormat::Yaml => serde_yaml::from_str(text).with_context(|| "parse catalog yaml")?,
        SourceFormat::Json => serde_json::from_str(text).with_context(|| "parse catalog json")?,
    })
}

fn build_rules(
    raws: Vec<(String, usize, RawRule)>,
    issues: &mut Vec<CatalogIssue>,
) -> Vec<Rule> {
    let mut rules = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for (source, idx, raw) in raws {
        let fallback_ref = format!("{}#{}", source, idx);
        for expanded in expand(raw, issues, &fallback_ref) {
            let rule_ref = expanded
                .rule_id
                .clone()
                .unwrap_or_else(|| fallback_ref.clone());
            match build_rule(expanded, &rule_ref, issues) {
                Some(rule) => {
                    if !seen.insert(rule.rule_id.clone()) {
                        issues.push(CatalogIssue {
                            rule_ref: rule.rule_id.clone(),
                            detail: "duplicate rule_id".to_string(),
                        });
                        continue;
                    }
                    rules.push(rule);
                }
                None => {}
            }
        }
    }

    rules
}

/// Loader-time list expansion: a `for_each` declaration becomes N concrete
/// rules with deterministic derived ids, so evaluators never see list rules.
fn expand(raw: RawRule, issues: &mut Vec<CatalogIssue>, fallback_ref: &str) -> Vec<RawRule> {
    let items = match raw.for_each.clone() {
        None => return vec![raw],
        Some(items) => items,
    };
    if items.is_empty() {
        issues.push(CatalogIssue {
            rule_ref: raw.rule_id.clone().unwrap_or_else(|| fallback_ref.to_string()),
            detail: "for_each must not be empty".to_string(),
        });
        return vec![];
    }

    let base_id = raw.rule_id.clone().unwrap_or_default();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let token = render_item(item);
            let mut r = raw.clone();
            r.for_each = None;
            r.rule_id = Some(format!("{}_{:03}", base_id, i + 1));
            r.path = r.path.map(|s| subst(&s, &token));
            r.name = r.name.map(|s| subst(&s, &token));
            r.allowed_dir = r.allowed_dir.map(|s| subst(&s, &token));
            r.search_roots = r
                .search_roots
                .map(|v| v.into_iter().map(|s| subst(&s, &token)).collect());
            r.file = r.file.map(|s| subst(&s, &token));
            r.field_path = r.field_path.map(|s| subst(&s, &token));
            r.expected = r.expected.map(|e| subst_value(e, item, &token));
            r
        })
        .collect()
}

fn render_item(item: &serde_json::Value) -> String {
    match item {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn subst(s: &str, token: &str) -> String {
    s.replace("{item}", token)
}

fn subst_value(
    expected: serde_json::Value,
    item: &serde_json::Value,
    token: &str,
) -> serde_json::Value {
    match expected {
        // An expected of exactly "{item}" takes the item's own value,
        // preserving its type.
        serde_json::Value::String(s) if s == "{item}" => item.clone(),
        serde_json::Value::String(s) => serde_json::Value::String(subst(&s, token)),
        other => other,
    }
}

fn build_rule(raw: RawRule, rule_ref: &str, issues: &mut Vec<CatalogIssue>) -> Option<Rule> {
    let before = issues.len();
    let mut report = |detail: String| {
        issues.push(CatalogIssue {
            rule_ref: rule_ref.to_string(),
            detail,
        });
    };

    let rule_id = match raw.rule_id.as_deref() {
        Some(id) if !id.trim().is_empty() => Some(id.to_string()),
        _ => {
            report("missing rule_id".to_string());
            None
        }
    };

    let kind = match raw.kind.as_deref() {
        Some(k) => match parse_kind(k) {
            Some(k) => Some(k),
            None => {
                report(format!("unknown kind '{}'", k));
                None
            }
        },
        None => {
            report("missing kind".to_string());
            None
        }
    };

    let severity = match raw.severity.as_deref() {
        Some(s) => match parse_severity(s) {
            Some(s) => Some(s),
            None => {
                report(format!("unknown severity '{}'", s));
                None
            }
        },
        None => {
            report("missing severity".to_string());
            None
        }
    };

    let priority = match raw.priority.as_deref() {
        Some(p) => match parse_priority(p) {
            Some(p) => Some(p),
            None => {
                report(format!("unknown priority '{}'", p));
                None
            }
        },
        None => {
            report("missing priority".to_string());
            None
        }
    };

    // Enforcement defaults to strict: an unstated rule blocks on failure.
    let enforcement = match raw.enforcement.as_deref() {
        Some(e) => match parse_enforcement(e) {
            Some(e) => Some(e),
            None => {
                report(format!("unknown enforcement '{}'", e));
                None
            }
        },
        None => Some(Enforcement::Strict),
    };

    let target = kind.and_then(|kind| build_target(kind, &raw, &mut report));

    if issues.len() > before {
        return None;
    }

    Some(Rule {
        rule_id: rule_id?,
        kind: kind?,
        severity: severity?,
        priority: priority?,
        enforcement: enforcement?,
        target: target?,
    })
}

fn build_target(
    kind: RuleKind,
    raw: &RawRule,
    report: &mut impl FnMut(String),
) -> Option<RuleTarget> {
    match kind {
        RuleKind::Structure => {
            let check = match raw.check.as_deref() {
                Some(c) => c,
                None => {
                    report("STRUCTURE rule missing check".to_string());
                    return None;
                }
            };
            match check {
                "exists" => {
                    let path = require_str(raw.path.clone(), "path", report)?;
                    Some(RuleTarget::Structure(StructureCheck::Exists { path }))
                }
                "dir_count" => {
                    let path = require_str(raw.path.clone(), "path", report)?;
                    let expected = match raw.expected_count {
                        Some(n) => n,
                        None => {
                            report("dir_count check missing expected_count".to_string());
                            return None;
                        }
                    };
                    Some(RuleTarget::Structure(StructureCheck::DirCount {
                        path,
                        expected,
                    }))
                }
                "unique_file" => {
                    let name = require_str(raw.name.clone(), "name", report)?;
                    let allowed_dir = require_str(raw.allowed_dir.clone(), "allowed_dir", report)?;
                    let search_roots = match raw.search_roots.clone() {
                        Some(roots) if !roots.is_empty() => roots,
                        _ => {
                            report("unique_file check missing search_roots".to_string());
                            return None;
                        }
                    };
                    Some(RuleTarget::Structure(StructureCheck::UniqueFile {
                        name,
                        allowed_dir,
                        search_roots,
                    }))
                }
                other => {
                    report(format!("unknown structure check '{}'", other));
                    None
                }
            }
        }
        RuleKind::FieldEquality => {
            let file = require_str(raw.file.clone(), "file", report)?;
            let field_path = require_str(raw.field_path.clone(), "field_path", report)?;
            let expected = match raw.expected.clone() {
                Some(v) => v,
                None => {
                    report("FIELD_EQUALITY rule missing expected".to_string());
                    return None;
                }
            };
            Some(RuleTarget::FieldEquality {
                file,
                field_path,
                expected,
                tolerance: raw.tolerance,
            })
        }
        RuleKind::ListEquality => {
            let file = require_str(raw.file.clone(), "file", report)?;
            let field_path = require_str(raw.field_path.clone(), "field_path", report)?;
            let expected = match raw.expected.clone() {
                Some(serde_json::Value::Array(items)) => items,
                Some(_) => {
                    report("LIST_EQUALITY expected must be a sequence".to_string());
                    return None;
                }
                None => {
                    report("LIST_EQUALITY rule missing expected".to_string());
                    return None;
                }
            };
            // Order-insensitive set comparison unless the rule marks order
            // as significant.
            let order = match raw.order.as_deref() {
                None => ListOrder::Unordered,
                Some("ordered") => ListOrder::Ordered,
                Some("unordered") => ListOrder::Unordered,
                Some(other) => {
                    report(format!("unknown list order '{}'", other));
                    return None;
                }
            };
            Some(RuleTarget::ListEquality {
                file,
                field_path,
                expected,
                order,
            })
        }
        RuleKind::LineHash => {
            let file = require_str(raw.file.clone(), "file", report)?;
            let line = match raw.line {
                Some(n) if n >= 1 => n,
                Some(_) => {
                    report("LINE_HASH line numbers are 1-based".to_string());
                    return None;
                }
                None => {
                    report("LINE_HASH rule missing line".to_string());
                    return None;
                }
            };
            let expected_hash = require_str(raw.expected_hash.clone(), "expected_hash", report)?;
            Some(RuleTarget::LineHash {
                file,
                line,
                expected_hash,
            })
        }
        RuleKind::Constraint => {
            let op = match raw.op.as_deref() {
                Some(o) => match parse_op(o) {
                    Some(o) => o,
                    None => {
                        report(format!("unknown constraint op '{}'", o));
                        return None;
                    }
                },
                None => {
                    report("CONSTRAINT rule missing op".to_string());
                    return None;
                }
            };
            let fields = match raw.fields.clone() {
                Some(fields) if !fields.is_empty() => {
                    let mut out = Vec::new();
                    for (i, f) in fields.into_iter().enumerate() {
                        match (f.file, f.field_path) {
                            (Some(file), Some(field_path)) => {
                                out.push(FieldRef { file, field_path })
                            }
                            _ => {
                                report(format!("constraint field #{} incomplete", i + 1));
                                return None;
                            }
                        }
                    }
                    out
                }
                _ => {
                    report("CONSTRAINT rule missing fields".to_string());
                    return None;
                }
            };
            match (op, fields.len()) {
                (ConstraintOp::RatioEquals, n) if n != 2 => {
                    report("ratio_equals requires exactly two fields".to_string());
                    return None;
                }
                (ConstraintOp::Lte | ConstraintOp::Gte, n) if n != 1 => {
                    report("lte/gte require exactly one field".to_string());
                    return None;
                }
                _ => {}
            }
            let expected = match raw.expected.as_ref().and_then(|v| v.as_f64()) {
                Some(v) => v,
                None => {
                    report("CONSTRAINT rule missing numeric expected".to_string());
                    return None;
                }
            };
            Some(RuleTarget::Constraint {
                op,
                fields,
                expected,
                epsilon: raw.epsilon.unwrap_or(1e-6),
            })
        }
    }
}

fn require_str(
    value: Option<String>,
    field: &str,
    report: &mut impl FnMut(String),
) -> Option<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Some(s),
        _ => {
            report(format!("missing {}", field));
            None
        }
    }
}

fn parse_kind(s: &str) -> Option<RuleKind> {
    match s {
        "STRUCTURE" => Some(RuleKind::Structure),
        "FIELD_EQUALITY" => Some(RuleKind::FieldEquality),
        "LIST_EQUALITY" => Some(RuleKind::ListEquality),
        "LINE_HASH" => Some(RuleKind::LineHash),
        "CONSTRAINT" => Some(RuleKind::Constraint),
        _ => None,
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s {
        "CRITICAL" => Some(Severity::Critical),
        "HIGH" => Some(Severity::High),
        "MEDIUM" => Some(Severity::Medium),
        "LOW" => Some(Severity::Low),
        "INFO" => Some(Severity::Info),
        _ => None,
    }
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s {
        "MUST" => Some(Priority::Must),
        "SHOULD" => Some(Priority::Should),
        "HAVE" => Some(Priority::Have),
        _ => None,
    }
}

fn parse_enforcement(s: &str) -> Option<Enforcement> {
    match s {
        "strict" => Some(Enforcement::Strict),
        "warn" => Some(Enforcement::Warn),
        "info" => Some(Enforcement::Info),
        _ => None,
    }
}

fn parse_op(s: &str) -> Option<ConstraintOp> {
    match s {
        "sum_equals" => Some(ConstraintOp::SumEquals),
        "ratio_equals" => Some(ConstraintOp::RatioEquals),
        "lte" => Some(ConstraintOp::Lte),
        "gte" => Some(ConstraintOp::Gte),
        _ => None,
    }
}
