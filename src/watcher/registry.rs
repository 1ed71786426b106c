//! Watched-subtree registry.
//!
//! Tracks every registered subtree together with its log file, owns the
//! exclusion set, and is the only component that talks to the
//! [`WatchSource`]. Event routing asks the registry which registration owns
//! a path; discovery and shutdown go through it too.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};
use crate::watcher::recorder;
use crate::watcher::source::WatchSource;

/// Absolute paths exempt from subtree registration.
///
/// Matching is exact: excluding a directory does not exclude its children,
/// and events under an excluded directory that reach a registered ancestor
/// are still recorded. Exclusion only stops the directory itself from
/// getting a watch and a log.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    paths: HashSet<PathBuf>,
}

impl ExclusionSet {
    /// Build a set from absolute paths.
    #[must_use]
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Add a path; returns `false` when it was already present.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    /// Exact-match membership test.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Number of excluded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no paths are excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// One watched subtree and the log file its changes are appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    /// Absolute directory this registration covers.
    pub root: PathBuf,
    /// The subtree's own log file, inside `root`.
    pub log_path: PathBuf,
    /// Whether the watch covers the whole subtree or direct children only.
    pub recursive: bool,
}

impl WatchRegistration {
    /// Create a registration for `root` with its derived log path.
    #[must_use]
    pub fn new(root: PathBuf, recursive: bool) -> Self {
        let log_path = Self::log_path_for(&root);
        Self {
            root,
            log_path,
            recursive,
        }
    }

    /// The log file name a directory's registration uses:
    /// `<dir>/log_<basename>.csv`.
    #[must_use]
    pub fn log_path_for(dir: &Path) -> PathBuf {
        let name = dir.file_name().map_or_else(
            || "root".to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        dir.join(format!("log_{name}.csv"))
    }
}

/// Registry of active watch registrations.
///
/// Registration is idempotent: discovering a subtree that is already
/// registered changes nothing, so duplicate creation notifications and the
/// startup scan racing live events are both harmless.
pub struct WatchRegistry {
    registrations: RwLock<Vec<Arc<WatchRegistration>>>,
    exclusions: ExclusionSet,
    source: Mutex<Box<dyn WatchSource>>,
}

impl WatchRegistry {
    /// Create a registry over `source` with a fixed exclusion set.
    #[must_use]
    pub fn new(source: Box<dyn WatchSource>, exclusions: ExclusionSet) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            exclusions,
            source: Mutex::new(source),
        }
    }

    /// Register the monitored root and every directory directly under it.
    ///
    /// The root itself is watched non-recursively with its own log, so
    /// top-level files are audited without double-covering the subtrees.
    /// Unreadable children are skipped with a warning; the root itself must
    /// be readable.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RootUnavailable`] when `root` is missing, not
    /// a directory, or unreadable.
    pub fn bootstrap(&self, root: &Path) -> Result<()> {
        let metadata = std::fs::metadata(root).map_err(|error| WatchError::RootUnavailable {
            path: root.display().to_string(),
            reason: error.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(WatchError::RootUnavailable {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        self.install(WatchRegistration::new(root.to_path_buf(), false))?;
        info!(root = %root.display(), "watching root");

        let entries = std::fs::read_dir(root).map_err(|error| WatchError::RootUnavailable {
            path: root.display().to_string(),
            reason: error.to_string(),
        })?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(error = %error, "skipping unreadable entry during startup scan");
                    continue;
                }
            };
            if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }
            let path = entry.path();
            if let Err(error) = self.discover_subtree(&path) {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to register subtree during startup scan"
                );
            }
        }
        Ok(())
    }

    /// Register `path` as a recursively watched subtree.
    ///
    /// Returns the new registration, or `None` when the path is excluded or
    /// already registered. The subtree's log file is created with its header
    /// before the watch starts, and an existing log is never truncated.
    ///
    /// # Errors
    ///
    /// Returns an error when the log file cannot be created or the watch
    /// source rejects the path; no registration is retained in that case.
    pub fn discover_subtree(&self, path: &Path) -> Result<Option<Arc<WatchRegistration>>> {
        if self.exclusions.contains(path) {
            debug!(path = %path.display(), "directory is excluded from registration");
            return Ok(None);
        }
        let registration = self.install(WatchRegistration::new(path.to_path_buf(), true))?;
        if let Some(registration) = &registration {
            info!(
                path = %registration.root.display(),
                log = %registration.log_path.display(),
                "registered subtree"
            );
        }
        Ok(registration)
    }

    /// Insert a registration unless its root is already covered.
    ///
    /// The duplicate check, log creation, and source registration happen
    /// under the write lock, so two discoveries of the same directory cannot
    /// interleave.
    fn install(&self, registration: WatchRegistration) -> Result<Option<Arc<WatchRegistration>>> {
        let registration = Arc::new(registration);
        let mut registrations = self.registrations.write();
        if registrations
            .iter()
            .any(|existing| existing.root == registration.root)
        {
            return Ok(None);
        }
        recorder::ensure_log_file(&registration.log_path)?;
        self.source
            .lock()
            .register(&registration.root, registration.recursive)?;
        registrations.push(Arc::clone(&registration));
        Ok(Some(registration))
    }

    /// The registration whose root is the longest prefix of `path`, if any.
    #[must_use]
    pub fn owner_of(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        self.registrations
            .read()
            .iter()
            .filter(|registration| path.starts_with(&registration.root))
            .max_by_key(|registration| registration.root.components().count())
            .cloned()
    }

    /// Whether `path` is in the exclusion set.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclusions.contains(path)
    }

    /// Snapshot of all active registrations.
    #[must_use]
    pub fn registrations(&self) -> Vec<Arc<WatchRegistration>> {
        self.registrations.read().clone()
    }

    /// Number of active registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Drop every registration, unregistering each from the source.
    ///
    /// Unregistration failures are logged and skipped; shutdown proceeds
    /// regardless.
    pub fn unregister_all(&self) {
        let mut registrations = self.registrations.write();
        let mut source = self.source.lock();
        for registration in registrations.drain(..) {
            if let Err(error) = source.unregister(&registration.root) {
                warn!(
                    path = %registration.root.display(),
                    error = %error,
                    "failed to unregister watch during shutdown"
                );
            }
        }
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("registrations", &self.registrations.read())
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}
