use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use sotv_core::CacheEntry;

use crate::ResultCache;

/// Durable cache: one JSON document mapping rule_id to entry, read at open
/// and rewritten by `persist`. An unreadable or malformed file is discarded
/// with a warning (cold start) rather than failing the run.
pub struct JsonFileCache {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, CacheEntry>>,
}

impl JsonFileCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(
                cache = %path.display(),
                error = %e,
                "discarding unreadable result cache, starting cold"
            );
            BTreeMap::new()
        });
        Self {
            path,
            inner: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> Result<BTreeMap<String, CacheEntry>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read cache {}", path.display()))?;
        let entries: BTreeMap<String, CacheEntry> =
            serde_json::from_str(&text).with_context(|| "parse cache json")?;
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultCache for JsonFileCache {
    fn get(&self, rule_id: &str) -> Option<CacheEntry> {
        self.inner.lock().unwrap().get(rule_id).cloned()
    }

    fn put(&self, entry: CacheEntry) {
        self.inner
            .lock()
            .unwrap()
            .insert(entry.rule_id.clone(), entry);
    }

    fn invalidate(&self, rule_id: &str) {
        self.inner.lock().unwrap().remove(rule_id);
    }

    fn invalidate_for_file(&self, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .retain(|_, entry| !entry.file_hashes.contains_key(path));
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let inner = self.inner.lock().unwrap();
        let bytes = serde_json::to_vec_pretty(&*inner)?;
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("write cache {}", self.path.display()))?;
        Ok(())
    }
}
