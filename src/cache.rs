//! Caller-owned cache of loaded tables.
//!
//! Entries are keyed by path, encoding and file modification time, so an edited
//! file is re-read on the next lookup. Loaded tables are shared read-only.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::loader::{load, LoadOptions, Loaded, SourceEncoding};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub encoding: SourceEncoding,
    /// `None` when the file is absent or its mtime is unavailable.
    pub modified: Option<SystemTime>,
}

impl CacheKey {
    pub fn for_source(path: &Path, encoding: SourceEncoding) -> Self {
        Self {
            path: path.to_path_buf(),
            encoding,
            modified: fs::metadata(path).and_then(|m| m.modified()).ok(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TableCache {
    entries: HashMap<CacheKey, Arc<Loaded>>,
    misses: u64,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached load for this source, reading the file on a miss.
    pub fn get_or_load(&mut self, path: impl AsRef<Path>, options: &LoadOptions) -> Arc<Loaded> {
        let path = path.as_ref();
        let key = CacheKey::for_source(path, options.encoding);

        if let Some(hit) = self.entries.get(&key) {
            debug!(path = %path.display(), "table cache hit");
            return Arc::clone(hit);
        }

        // A new mtime supersedes older entries for the same source.
        self.entries
            .retain(|k, _| !(k.path == key.path && k.encoding == key.encoding));

        debug!(path = %path.display(), "table cache miss");
        self.misses += 1;
        let loaded = Arc::new(load(path, options));
        self.entries.insert(key, Arc::clone(&loaded));
        loaded
    }

    /// Drop every entry for `path`, whatever its encoding. Returns how many went.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let before = self.entries.len();
        self.entries.retain(|k, _| k.path != path);
        before - self.entries.len()
    }

    /// Force a fresh read of `path`.
    pub fn reload(&mut self, path: impl AsRef<Path>, options: &LoadOptions) -> Arc<Loaded> {
        let path = path.as_ref();
        self.invalidate(path);
        self.get_or_load(path, options)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of loads performed so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
