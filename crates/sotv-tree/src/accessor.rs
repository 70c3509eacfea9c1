use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hash recorded for a tracked path that does not exist. Keeps absent files
/// representable in cache entries so "still absent" revalidates as a match.
pub const MISSING_HASH: &str = "missing";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Typed outcome for a path that may be absent. Evaluators treat `Missing`
/// as a normal failing validation outcome, never as a system fault.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

/// Splits on `\n`, strips a trailing `\r` per line, and drops the empty
/// tail after a final newline, mirroring `str::lines` over raw bytes.
fn split_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = bytes
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

#[derive(Default)]
struct Caches {
    exists: HashMap<String, bool>,
    bytes: HashMap<String, Lookup<Vec<u8>>>,
    yaml: HashMap<String, Lookup<(serde_json::Value, String)>>,
    lines: HashMap<String, Lookup<(Vec<Vec<u8>>, String)>>,
    listings: HashMap<String, Lookup<Vec<String>>>,
    subdirs: HashMap<String, Lookup<Vec<String>>>,
    walks: HashMap<String, Lookup<Vec<String>>>,
    tracked: HashMap<String, String>,
}

/// Cached read access to the target repository. Each distinct path is
/// touched at most once per run; repeat reads come from the cache, so the
/// tree behaves as a consistent snapshot for the lifetime of one run.
///
/// Interior mutability behind one `Mutex`, shared by parallel evaluators.
pub struct FileTree {
    root: PathBuf,
    inner: Mutex<Caches>,
}

impl FileTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inner: Mutex::new(Caches::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner.exists.get(rel) {
            return *v;
        }
        let v = self.resolve(rel).exists();
        inner.exists.insert(rel.to_string(), v);
        v
    }

    fn bytes_locked(&self, inner: &mut Caches, rel: &str) -> Result<Lookup<Vec<u8>>> {
        if let Some(cached) = inner.bytes.get(rel) {
            return Ok(cached.clone());
        }
        let path = self.resolve(rel);
        let lookup = if path.is_file() {
            let bytes =
                std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            Lookup::Found(bytes)
        } else {
            Lookup::Missing
        };
        inner.bytes.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    /// Raw content hash (SHA-256 over bytes). `Missing` if the file is absent.
    pub fn content_hash(&self, rel: &str) -> Result<Lookup<String>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(match self.bytes_locked(&mut inner, rel)? {
            Lookup::Found(bytes) => Lookup::Found(sha256_hex(&bytes)),
            Lookup::Missing => Lookup::Missing,
        })
    }

    /// Parsed YAML document plus its content hash. Parse failures surface
    /// as errors for the caller to contain; the raw bytes stay cached.
    pub fn read_yaml(&self, rel: &str) -> Result<Lookup<(serde_json::Value, String)>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.yaml.get(rel) {
            return Ok(cached.clone());
        }
        let lookup = match self.bytes_locked(&mut inner, rel)? {
            Lookup::Found(bytes) => {
                let hash = sha256_hex(&bytes);
                let parsed: serde_json::Value = serde_yaml::from_slice(&bytes)
                    .with_context(|| format!("parse yaml {}", rel))?;
                Lookup::Found((parsed, hash))
            }
            Lookup::Missing => Lookup::Missing,
        };
        inner.yaml.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    /// Raw byte lines (1-based addressing is the caller's concern) plus the
    /// whole-file content hash. Lines stay bytes so hashing them never
    /// depends on the file being valid UTF-8.
    pub fn read_lines(&self, rel: &str) -> Result<Lookup<(Vec<Vec<u8>>, String)>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.lines.get(rel) {
            return Ok(cached.clone());
        }
        let lookup = match self.bytes_locked(&mut inner, rel)? {
            Lookup::Found(bytes) => {
                let hash = sha256_hex(&bytes);
                Lookup::Found((split_lines(&bytes), hash))
            }
            Lookup::Missing => Lookup::Missing,
        };
        inner.lines.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    /// Sorted names of all entries directly under a directory.
    pub fn list_dir(&self, rel: &str) -> Result<Lookup<Vec<String>>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.listings.get(rel) {
            return Ok(cached.clone());
        }
        let lookup = Self::read_listing(&self.resolve(rel), |_| true)?;
        inner.listings.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    /// Sorted names of subdirectories directly under a directory.
    pub fn list_subdirs(&self, rel: &str) -> Result<Lookup<Vec<String>>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.subdirs.get(rel) {
            return Ok(cached.clone());
        }
        let lookup = Self::read_listing(&self.resolve(rel), |p| p.is_dir())?;
        inner.subdirs.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    fn read_listing(
        path: &Path,
        keep: impl Fn(&Path) -> bool,
    ) -> Result<Lookup<Vec<String>>> {
        if !path.is_dir() {
            return Ok(Lookup::Missing);
        }
        let mut names = Vec::new();
        for entry in
            std::fs::read_dir(path).with_context(|| format!("list {}", path.display()))?
        {
            let entry = entry?;
            if keep(&entry.path()) {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(Lookup::Found(names))
    }

    /// Sorted relative paths of every file under a directory, recursively.
    pub fn walk_files(&self, rel: &str) -> Result<Lookup<Vec<String>>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.walks.get(rel) {
            return Ok(cached.clone());
        }
        let base = self.resolve(rel);
        let lookup = if base.is_dir() {
            let mut files = Vec::new();
            Self::walk_into(&base, &base, true, &mut files)?;
            files.sort();
            Lookup::Found(files)
        } else {
            Lookup::Missing
        };
        inner.walks.insert(rel.to_string(), lookup.clone());
        Ok(lookup)
    }

    fn walk_into(
        base: &Path,
        dir: &Path,
        files_only: bool,
        out: &mut Vec<String>,
    ) -> Result<()> {
        for entry in std::fs::read_dir(dir).with_context(|| format!("walk {}", dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            if path.is_dir() {
                if !files_only {
                    out.push(rel);
                }
                Self::walk_into(base, &path, files_only, out)?;
            } else {
                out.push(rel);
            }
        }
        Ok(())
    }

    /// Cache-invalidation hash for a tracked path.
    ///
    /// Files hash by content. Directories hash over their sorted recursive
    /// entry paths, so any addition, removal, or rename below the directory
    /// changes the hash. Absent paths hash to [`MISSING_HASH`].
    pub fn tracked_hash(&self, rel: &str) -> Result<String> {
        {
            let inner = self.inner.lock().unwrap();
            if let Some(cached) = inner.tracked.get(rel) {
                return Ok(cached.clone());
            }
        }
        let path = self.resolve(rel);
        let hash = if path.is_file() {
            match self.content_hash(rel)? {
                Lookup::Found(h) => h,
                Lookup::Missing => MISSING_HASH.to_string(),
            }
        } else if path.is_dir() {
            let mut entries = Vec::new();
            Self::walk_into(&path, &path, false, &mut entries)?;
            entries.sort();
            sha256_hex(entries.join("\n").as_bytes())
        } else {
            MISSING_HASH.to_string()
        };
        let mut inner = self.inner.lock().unwrap();
        inner
            .tracked
            .entry(rel.to_string())
            .or_insert_with(|| hash.clone());
        Ok(hash)
    }
}
