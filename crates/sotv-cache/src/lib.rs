pub mod memory;
pub mod store;

pub use memory::*;
pub use store::*;

use sotv_core::CacheEntry;
use sotv_tree::FileTree;

/// Persisted validation memos keyed by rule id. The whole-map lock gives
/// per-rule-id write isolation under concurrent workers for free.
pub trait ResultCache: Send + Sync {
    fn get(&self, rule_id: &str) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry);
    fn invalidate(&self, rule_id: &str);
    /// Drop every entry that tracks the given path.
    fn invalidate_for_file(&self, path: &str);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Flush to durable storage. No-op for non-durable caches.
    fn persist(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An entry is reusable iff every tracked path's live hash still matches the
/// recorded hash AND the entry is within its TTL. A mismatch stales only
/// this entry, never the whole cache.
pub fn is_fresh(
    entry: &CacheEntry,
    tree: &FileTree,
    ttl_seconds: i64,
    now_unix: i64,
) -> anyhow::Result<bool> {
    if now_unix - entry.recorded_at_unix > ttl_seconds {
        return Ok(false);
    }
    for (path, recorded) in &entry.file_hashes {
        if &tree.tracked_hash(path)? != recorded {
            return Ok(false);
        }
    }
    Ok(true)
}
