use serde::{Deserialize, Serialize};

use crate::model::ValidationResult;
use crate::types::{Enforcement, Priority};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warned: usize,
}

impl TierCounts {
    fn record(&mut self, r: &ValidationResult) {
        self.total += 1;
        if r.passed {
            self.passed += 1;
        } else if r.enforcement == Enforcement::Warn {
            self.warned += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Aggregate over one run's full result set. Always constructed fresh via
/// [`aggregate`]; never mutated incrementally.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scorecard {
    pub must: TierCounts,
    pub should: TierCounts,
    pub have: TierCounts,
    pub weighted_score: f64,
    pub blocking_failures: usize,
    /// PASS iff `blocking_failures == 0`, independent of the weighted score.
    pub passed: bool,
}

/// Pure function of the result list: tier rollups, MoSCoW-weighted score,
/// blocking-failure count.
pub fn aggregate(results: &[ValidationResult]) -> Scorecard {
    let mut must = TierCounts::default();
    let mut should = TierCounts::default();
    let mut have = TierCounts::default();
    let mut blocking_failures = 0usize;

    for r in results {
        match r.priority {
            Priority::Must => must.record(r),
            Priority::Should => should.record(r),
            Priority::Have => have.record(r),
        }
        if r.is_blocking_failure() {
            blocking_failures += 1;
        }
    }

    let denom = must.total as f64 * Priority::Must.weight()
        + should.total as f64 * Priority::Should.weight()
        + have.total as f64 * Priority::Have.weight();
    let numer = must.passed as f64 * Priority::Must.weight()
        + should.passed as f64 * Priority::Should.weight()
        + have.passed as f64 * Priority::Have.weight();

    // An empty result set scores 100: nothing to hold against the run.
    let weighted_score = if denom == 0.0 { 100.0 } else { numer / denom * 100.0 };

    Scorecard {
        must,
        should,
        have,
        weighted_score,
        blocking_failures,
        passed: blocking_failures == 0,
    }
}
