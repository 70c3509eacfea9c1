use thiserror::Error;

use crate::model::ValidationResult;

/// One malformed-rule finding produced while loading a catalog.
#[derive(Clone, Debug)]
pub struct CatalogIssue {
    /// Id of the offending rule when one could be read, else the source index.
    pub rule_ref: String,
    pub detail: String,
}

/// Malformed rule catalog. Load is all-or-nothing per source, but the issue
/// list is exhaustive: every malformed rule appears, not just the first.
#[derive(Debug, Error)]
pub struct CatalogLoadError {
    pub source_path: String,
    pub issues: Vec<CatalogIssue>,
}

impl std::fmt::Display for CatalogLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "catalog {} failed to load with {} issue(s):",
            self.source_path,
            self.issues.len()
        )?;
        for issue in &self.issues {
            writeln!(f, "  [{}] {}", issue.rule_ref, issue.detail)?;
        }
        Ok(())
    }
}

/// Errors that abort a run. Everything else is contained and represented
/// as a failing [`ValidationResult`].
#[derive(Debug, Error)]
pub enum RunError {
    /// Cancellation or deadline hit before all rules evaluated. No scorecard
    /// is emitted; cache entries written so far remain valid. The partial
    /// result list is carried for best-effort reporting only.
    #[error("run incomplete: {evaluated} of {total} rules evaluated ({reason})")]
    Incomplete {
        evaluated: usize,
        total: usize,
        reason: String,
        partial: Vec<ValidationResult>,
    },
    /// A rule or priority filter selected zero catalog rules. A typo'd
    /// rule id must not read as a clean run, so this aborts instead of
    /// scoring an empty result set.
    #[error("no catalog rules matched {filter}")]
    NoRulesMatched { filter: String },
}
