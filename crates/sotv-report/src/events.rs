use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sotv_core::Scorecard;

/// One line of run history, appended after a completed run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub catalog_hash: String,
    pub finished_at_unix: i64,
    pub weighted_score: f64,
    pub blocking_failures: usize,
    pub passed: bool,
}

impl RunEvent {
    pub fn from_scorecard(
        run_id: &str,
        catalog_hash: &str,
        finished_at_unix: i64,
        card: &Scorecard,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            catalog_hash: catalog_hash.to_string(),
            finished_at_unix,
            weighted_score: card.weighted_score,
            blocking_failures: card.blocking_failures,
            passed: card.passed,
        }
    }
}

/// Where finished runs get recorded. The run itself never depends on prior
/// events; this is an append-only audit trail.
pub trait EventSink: Send + Sync {
    fn append_event(&self, event: &RunEvent) -> Result<()>;
}

/// Sink for callers that keep no history.
pub struct NullSink;

impl EventSink for NullSink {
    fn append_event(&self, _event: &RunEvent) -> Result<()> {
        Ok(())
    }
}

/// JSONL file, one event per line.
pub struct FsEventLog {
    pub path: PathBuf,
}

impl FsEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EventSink for FsEventLog {
    fn append_event(&self, event: &RunEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log {}", self.path.display()))?;
        writeln!(f, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }
}
