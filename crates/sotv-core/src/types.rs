use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Structure,
    FieldEquality,
    ListEquality,
    LineHash,
    Constraint,
}

/// Diagnostic weight of a rule. Independent of [`Priority`], which only
/// affects score weighting. Variants are declared in ascending order so
/// `max` can be used to escalate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// MoSCoW-style priority tier. Governs scoring weight, not pass/fail.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Must,
    Should,
    Have,
}

impl Priority {
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Must => 1.0,
            Priority::Should => 0.5,
            Priority::Have => 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// A failure blocks the run.
    Strict,
    /// A failure surfaces as a warning only.
    Warn,
    /// Purely informational.
    Info,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    Ordered,
    Unordered,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOp {
    SumEquals,
    RatioEquals,
    Lte,
    Gte,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Text,
    Markdown,
}
