//! Shared fingerprint cache keyed by absolute path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::watcher::fingerprint::FileFingerprint;

/// Process-wide map from absolute file path to last observed fingerprint.
///
/// Cloning is cheap; all clones share the same underlying map. The cache is
/// advisory only: entries are never expired, and a miss simply means the
/// next modification event is recorded rather than suppressed.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    entries: Arc<Mutex<HashMap<PathBuf, FileFingerprint>>>,
}

impl MetadataCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed fingerprint for `path`, if any.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<FileFingerprint> {
        self.entries.lock().get(path).copied()
    }

    /// Record `fingerprint` as the latest observation for `path`.
    pub fn insert(&self, path: PathBuf, fingerprint: FileFingerprint) {
        self.entries.lock().insert(path, fingerprint);
    }

    /// Forget `path`, returning its fingerprint if one was cached.
    pub fn remove(&self, path: &Path) -> Option<FileFingerprint> {
        self.entries.lock().remove(path)
    }

    /// Re-key an entry from `old` to `new` in one step, so no observer can
    /// see the file cached under both paths.
    ///
    /// Returns `false` when `old` had no entry (the new path is then left
    /// uncached too).
    pub fn rename(&self, old: &Path, new: PathBuf) -> bool {
        let mut entries = self.entries.lock();
        match entries.remove(old) {
            Some(fingerprint) => {
                entries.insert(new, fingerprint);
                true
            }
            None => false,
        }
    }

    /// Whether `path` currently has a cached fingerprint.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
