use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use sotv_cache::{is_fresh, JsonFileCache, ResultCache};
use sotv_catalog::{load_catalog, Catalog};
use sotv_core::{aggregate, CacheEntry, Priority, Rule, RunError, RunId, ValidationResult};
use sotv_eval::{evaluate_rule, tracked_files};
use sotv_report::{EventSink, FsEventLog, NullSink, RunEvent, RunReport};
use sotv_tree::FileTree;

use crate::config::Options;
use crate::util::now_unix;

/// Which catalog rules a run covers. Empty filter selects everything.
#[derive(Clone, Debug, Default)]
pub struct RunFilter {
    pub rule_id: Option<String>,
    pub priority: Option<Priority>,
}

impl RunFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.rule_id.is_none() && self.priority.is_none()
    }

    fn describe(&self) -> String {
        match (&self.rule_id, self.priority) {
            (Some(id), _) => format!("rule id '{}'", id),
            (None, Some(p)) => format!("priority {:?}", p),
            (None, None) => "empty filter".to_string(),
        }
    }

    fn matches(&self, rule: &Rule) -> bool {
        if let Some(id) = &self.rule_id {
            if rule.rule_id != *id {
                return false;
            }
        }
        if let Some(p) = self.priority {
            if rule.priority != p {
                return false;
            }
        }
        true
    }
}

/// Orchestrates one validation run: catalog iteration in declaration order,
/// cache consult per rule, optional worker pool, deadline cancellation.
pub struct Runner {
    options: Options,
    catalog: Catalog,
    tree: FileTree,
    cache: Box<dyn ResultCache>,
    events: Box<dyn EventSink>,
}

impl Runner {
    pub fn new(
        options: Options,
        catalog: Catalog,
        tree: FileTree,
        cache: Box<dyn ResultCache>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            options,
            catalog,
            tree,
            cache,
            events,
        }
    }

    /// Wire a runner from a target directory: `sotv.toml` if present (else
    /// defaults), the configured catalog and cache, JSONL event log when set.
    pub fn open(target_root: &Path, catalog_override: Option<&Path>) -> Result<Self> {
        let cfg_path = Options::config_path(target_root);
        let options = if cfg_path.exists() {
            Options::load_from(&cfg_path)?
        } else {
            Options::default_for_repo()
        };

        let catalog_path = match catalog_override {
            Some(p) => p.to_path_buf(),
            None => options.resolve(target_root, &options.catalog_path),
        };
        let catalog = load_catalog(&catalog_path)?;

        let tree = FileTree::new(target_root);
        let cache: Box<dyn ResultCache> = Box::new(JsonFileCache::open(
            options.resolve(target_root, &options.cache_path),
        ));
        let events: Box<dyn EventSink> = match &options.event_log {
            Some(p) => Box::new(FsEventLog::new(options.resolve(target_root, p))),
            None => Box::new(NullSink),
        };

        Ok(Self::new(options, catalog, tree, cache, events))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// One run over the filtered catalog. All results carry the run's start
    /// timestamp so re-emission is byte-stable. Returns
    /// [`RunError::Incomplete`] when the deadline (or fail-fast) left rules
    /// unevaluated; cache entries written before the cutoff still persist.
    pub fn run(&self, filter: &RunFilter, deadline_unix: Option<i64>) -> Result<RunReport> {
        let started = now_unix();
        let selected: Vec<&Rule> = self
            .catalog
            .rules
            .iter()
            .filter(|r| filter.matches(r))
            .collect();
        let total = selected.len();
        if total == 0 && !filter.is_unrestricted() {
            return Err(RunError::NoRulesMatched {
                filter: filter.describe(),
            }
            .into());
        }
        tracing::info!(rules = total, parallelism = self.options.parallelism, "starting run");

        let (results, stop_reason) = if self.options.parallelism > 1 {
            self.run_parallel(&selected, started, deadline_unix)
        } else {
            self.run_sequential(&selected, started, deadline_unix)
        };

        self.cache.persist()?;

        if results.len() < total {
            let reason = stop_reason.unwrap_or_else(|| "deadline exceeded".to_string());
            tracing::warn!(evaluated = results.len(), total, %reason, "run incomplete");
            return Err(RunError::Incomplete {
                evaluated: results.len(),
                total,
                reason,
                partial: results,
            }
            .into());
        }

        let scorecard = aggregate(&results);
        let report = RunReport {
            catalog_hash: self.catalog.catalog_hash.clone(),
            scorecard,
            results,
        };
        let run_id = RunId::new();
        self.events.append_event(&RunEvent::from_scorecard(
            run_id.as_str(),
            &report.catalog_hash,
            now_unix(),
            &report.scorecard,
        ))?;
        tracing::info!(
            score = report.scorecard.weighted_score,
            blocking = report.scorecard.blocking_failures,
            passed = report.scorecard.passed,
            "run complete"
        );
        Ok(report)
    }

    fn run_sequential(
        &self,
        rules: &[&Rule],
        now: i64,
        deadline: Option<i64>,
    ) -> (Vec<ValidationResult>, Option<String>) {
        let mut results = Vec::with_capacity(rules.len());
        let mut stop_reason = None;
        for rule in rules {
            if deadline.is_some_and(|d| now_unix() >= d) {
                stop_reason = Some("deadline exceeded".to_string());
                break;
            }
            let result = self.evaluate_one(rule, now);
            let blocking = result.is_blocking_failure();
            results.push(result);
            if self.options.fail_fast && blocking {
                stop_reason = Some("fail-fast after blocking failure".to_string());
                break;
            }
        }
        (results, stop_reason)
    }

    /// Worker pool over an atomic index. Results are collected with their
    /// catalog index and re-sorted, so parallelism never changes output
    /// order.
    fn run_parallel(
        &self,
        rules: &[&Rule],
        now: i64,
        deadline: Option<i64>,
    ) -> (Vec<ValidationResult>, Option<String>) {
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let stop_reason: Mutex<Option<String>> = Mutex::new(None);
        let collected: Mutex<Vec<(usize, ValidationResult)>> =
            Mutex::new(Vec::with_capacity(rules.len()));
        let workers = self.options.parallelism.min(rules.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    if idx >= rules.len() {
                        break;
                    }
                    if deadline.is_some_and(|d| now_unix() >= d) {
                        stop.store(true, Ordering::SeqCst);
                        stop_reason
                            .lock()
                            .unwrap()
                            .get_or_insert_with(|| "deadline exceeded".to_string());
                        break;
                    }
                    let result = self.evaluate_one(rules[idx], now);
                    let blocking = result.is_blocking_failure();
                    collected.lock().unwrap().push((idx, result));
                    if self.options.fail_fast && blocking {
                        stop.store(true, Ordering::SeqCst);
                        stop_reason
                            .lock()
                            .unwrap()
                            .get_or_insert_with(|| "fail-fast after blocking failure".to_string());
                        break;
                    }
                });
            }
        });

        let mut collected = collected.into_inner().unwrap();
        collected.sort_by_key(|(idx, _)| *idx);
        let results = collected.into_iter().map(|(_, r)| r).collect();
        (results, stop_reason.into_inner().unwrap())
    }

    /// Cache consult, then evaluate-and-record. A fresh entry's result is
    /// returned verbatim, original timestamp included. Cache faults never
    /// abort the rule; they degrade to re-evaluation or an uncached result.
    fn evaluate_one(&self, rule: &Rule, now: i64) -> ValidationResult {
        if let Some(entry) = self.cache.get(&rule.rule_id) {
            match is_fresh(&entry, &self.tree, self.options.cache_ttl_seconds, now) {
                Ok(true) => {
                    tracing::debug!(rule = %rule.rule_id, "cache hit");
                    return entry.result;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(rule = %rule.rule_id, error = %e, "cache revalidation failed");
                }
            }
        }

        let result = evaluate_rule(rule, &self.tree, now);
        match self.hashes_for(rule) {
            Ok(file_hashes) => self.cache.put(CacheEntry {
                rule_id: rule.rule_id.clone(),
                result: result.clone(),
                file_hashes,
                recorded_at_unix: now,
            }),
            Err(e) => {
                tracing::warn!(rule = %rule.rule_id, error = %e, "result not cached");
            }
        }
        result
    }

    fn hashes_for(&self, rule: &Rule) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for path in tracked_files(rule) {
            let hash = self.tree.tracked_hash(&path)?;
            map.insert(path, hash);
        }
        Ok(map)
    }
}
