use anyhow::Result;
use serde::{Deserialize, Serialize};
use sotv_core::{sort_json, ReportFormat, Scorecard, ValidationResult};

/// Everything one run produced. Emitters only re-shape this struct; they
/// never compute anything the runner did not already decide. Run identity
/// and wall-clock metadata live in the event log, not here, so two runs
/// over the same inputs emit byte-identical reports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub catalog_hash: String,
    pub scorecard: Scorecard,
    /// Catalog order, preserved from the run.
    pub results: Vec<ValidationResult>,
}

pub fn emit(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => render_json(report),
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Markdown => Ok(render_markdown(report)),
    }
}

/// Scorecard-only view, same format choices as [`emit`] but without the
/// per-rule rows.
pub fn emit_summary(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => {
            let value = sort_json(serde_json::json!({
                "catalog_hash": report.catalog_hash,
                "scorecard": report.scorecard,
            }));
            Ok(serde_json::to_string_pretty(&value)?)
        }
        ReportFormat::Text => Ok(summary_lines(&report.scorecard)),
        ReportFormat::Markdown => {
            let mut out = String::new();
            out.push_str("# Validation Summary\n\n");
            out.push_str(&format!("- catalog: `{}`\n", report.catalog_hash));
            out.push_str(&verdict_lines(&report.scorecard));
            out.push_str(&tier_table(&report.scorecard));
            Ok(out)
        }
    }
}

/// Canonical JSON: keys sorted recursively so two identical runs are
/// byte-identical.
fn render_json(report: &RunReport) -> Result<String> {
    let value = sort_json(serde_json::to_value(report)?);
    Ok(serde_json::to_string_pretty(&value)?)
}

fn status(r: &ValidationResult) -> &'static str {
    if r.passed {
        "PASS"
    } else if r.is_blocking_failure() {
        "FAIL"
    } else {
        "WARN"
    }
}

fn summary_lines(card: &Scorecard) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "must {}/{}  should {}/{}  have {}/{}\n",
        card.must.passed,
        card.must.total,
        card.should.passed,
        card.should.total,
        card.have.passed,
        card.have.total
    ));
    out.push_str(&format!(
        "weighted score {:.1}  blocking failures {}\n",
        card.weighted_score, card.blocking_failures
    ));
    out.push_str(if card.passed { "RESULT: PASS\n" } else { "RESULT: FAIL\n" });
    out
}

fn verdict_lines(card: &Scorecard) -> String {
    format!(
        "- weighted score: **{:.1}**\n- blocking failures: **{}**\n- result: **{}**\n\n",
        card.weighted_score,
        card.blocking_failures,
        if card.passed { "PASS" } else { "FAIL" }
    )
}

fn tier_table(card: &Scorecard) -> String {
    let mut out = String::new();
    out.push_str("| tier | passed | failed | warned | total |\n");
    out.push_str("|------|-------:|-------:|-------:|------:|\n");
    for (name, tier) in [
        ("must", &card.must),
        ("should", &card.should),
        ("have", &card.have),
    ] {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            name, tier.passed, tier.failed, tier.warned, tier.total
        ));
    }
    out
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("catalog {}\n\n", report.catalog_hash));
    for r in &report.results {
        out.push_str(&format!(
            "[{:<4}] {:<8} {:<6} {}  {}\n",
            status(r),
            format!("{:?}", r.severity).to_uppercase(),
            format!("{:?}", r.priority).to_uppercase(),
            r.rule_id,
            r.message
        ));
    }
    out.push('\n');
    out.push_str(&summary_lines(&report.scorecard));
    out
}

fn render_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Validation Report\n\n");
    out.push_str(&format!("- catalog: `{}`\n", report.catalog_hash));
    out.push_str(&verdict_lines(&report.scorecard));
    out.push_str(&tier_table(&report.scorecard));

    out.push_str("\n| status | rule | severity | priority | message |\n");
    out.push_str("|--------|------|----------|----------|---------|\n");
    for r in &report.results {
        out.push_str(&format!(
            "| {} | `{}` | {:?} | {:?} | {} |\n",
            status(r),
            r.rule_id,
            r.severity,
            r.priority,
            r.message.replace('|', "\\|")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use sotv_core::{aggregate, Enforcement, Priority, Severity};

    fn sample() -> RunReport {
        let results = vec![
            ValidationResult {
                rule_id: "R-001".into(),
                passed: true,
                severity: Severity::High,
                priority: Priority::Must,
                enforcement: Enforcement::Strict,
                message: "shares sum to 100".into(),
                evidence: BTreeMap::from([(
                    "actual".to_string(),
                    serde_json::json!(100.0),
                )]),
                timestamp_unix: 1_700_000_000,
            },
            ValidationResult {
                rule_id: "R-002".into(),
                passed: false,
                severity: Severity::Medium,
                priority: Priority::Should,
                enforcement: Enforcement::Warn,
                message: "roster drifted".into(),
                evidence: BTreeMap::new(),
                timestamp_unix: 1_700_000_000,
            },
        ];
        RunReport {
            catalog_hash: "abc123".into(),
            scorecard: aggregate(&results),
            results,
        }
    }

    #[test]
    fn json_output_is_byte_stable() {
        let report = sample();
        let a = emit(&report, ReportFormat::Json).unwrap();
        let b = emit(&report, ReportFormat::Json).unwrap();
        assert_eq!(a, b);
        // Keys come out sorted at every level.
        let v: serde_json::Value = serde_json::from_str(&a).unwrap();
        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn text_output_carries_verdict_and_score() {
        let out = emit(&sample(), ReportFormat::Text).unwrap();
        assert!(out.contains("R-001"));
        assert!(out.contains("[WARN]"));
        assert!(out.contains("RESULT: PASS"));
        assert!(out.contains("weighted score"));
    }

    #[test]
    fn markdown_tables_list_every_result_in_order() {
        let out = emit(&sample(), ReportFormat::Markdown).unwrap();
        let first = out.find("R-001").unwrap();
        let second = out.find("R-002").unwrap();
        assert!(first < second);
        assert!(out.contains("| must |"));
    }

    #[test]
    fn warn_failure_is_not_rendered_as_fail() {
        let out = emit(&sample(), ReportFormat::Text).unwrap();
        assert!(!out.contains("[FAIL]"));
    }

    #[test]
    fn summary_json_drops_per_rule_results() {
        let out = emit_summary(&sample(), ReportFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["catalog_hash", "scorecard"]);
        assert!(!out.contains("R-001"));
    }

    #[test]
    fn summary_honors_the_requested_format() {
        let text = emit_summary(&sample(), ReportFormat::Text).unwrap();
        assert!(text.contains("RESULT: PASS"));
        assert!(!text.contains("R-002"));

        let md = emit_summary(&sample(), ReportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Validation Summary"));
        assert!(md.contains("| must |"));
        assert!(!md.contains("R-002"));
    }
}
