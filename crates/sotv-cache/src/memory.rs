use std::collections::HashMap;
use std::sync::Mutex;

use sotv_core::CacheEntry;

use crate::ResultCache;

/// In-memory cache for tests and single-shot runs. Not durable.
#[derive(Default)]
pub struct InMemoryCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultCache for InMemoryCache {
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
}
