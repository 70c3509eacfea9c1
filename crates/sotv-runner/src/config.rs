use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Flat run options, loaded from `sotv.toml` at the target root. No global
/// state: the struct is passed explicitly to the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    pub catalog_path: String,
    pub cache_path: String,
    #[serde(default = "default_ttl")]
    pub cache_ttl_seconds: i64,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub fail_fast: bool,
    /// JSONL run history, appended after each completed run. None disables.
    #[serde(default)]
    pub event_log: Option<String>,
}

fn default_ttl() -> i64 {
    86_400
}

fn default_parallelism() -> usize {
    1
}

impl Options {
    pub fn default_for_repo() -> Self {
        Self {
            catalog_path: "catalog.yaml".to_string(),
            cache_path: ".sotv/cache.json".to_string(),
            cache_ttl_seconds: default_ttl(),
            parallelism: default_parallelism(),
            fail_fast: false,
            event_log: None,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let opts: Options = toml::from_str(&s).with_context(|| "parse sotv.toml")?;
        Ok(opts)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(target_root: &Path) -> PathBuf {
        target_root.join("sotv.toml")
    }

    /// Tilde-expanded, resolved against the target root when relative.
    pub fn resolve(&self, target_root: &Path, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw).to_string();
        let p = PathBuf::from(expanded);
        if p.is_absolute() {
            p
        } else {
            target_root.join(p)
        }
    }
}
