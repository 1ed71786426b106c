//! Change detection policy.
//!
//! One entry point per raw event kind, applying the rules that separate a
//! recordable change from noise: the subtree's own log never logs itself,
//! directory modifications are dropped, and modification bursts collapse
//! through the fingerprint cache. Everything that survives is routed to the
//! log of the registration owning the path.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::session::MonitorStats;
use crate::watcher::cache::MetadataCache;
use crate::watcher::events::{ChangeKind, ChangeRecord, RawEvent};
use crate::watcher::fingerprint::FileFingerprint;
use crate::watcher::recorder::EventRecorder;
use crate::watcher::registry::WatchRegistry;

/// Applies recording policy to raw watch events.
pub struct ChangeDetector {
    cache: MetadataCache,
    registry: Arc<WatchRegistry>,
    recorder: EventRecorder,
    stats: Arc<MonitorStats>,
}

impl ChangeDetector {
    /// Create a detector over shared session state.
    #[must_use]
    pub fn new(
        cache: MetadataCache,
        registry: Arc<WatchRegistry>,
        recorder: EventRecorder,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            cache,
            registry,
            recorder,
            stats,
        }
    }

    /// Process one raw event.
    pub async fn handle_event(&self, event: RawEvent) {
        self.stats.events_seen.fetch_add(1, Ordering::Relaxed);
        match event {
            RawEvent::Created { path, is_dir } => self.on_created(path, is_dir).await,
            RawEvent::Modified { path, is_dir } => self.on_modified(path, is_dir).await,
            RawEvent::Deleted { path } => self.on_deleted(path).await,
            RawEvent::Moved { from, to, is_dir } => self.on_moved(from, to, is_dir).await,
        }
    }

    async fn on_created(&self, path: PathBuf, is_dir: bool) {
        if self.is_own_log(&path) {
            return;
        }
        if is_dir {
            if self.registry.is_excluded(&path) {
                debug!(path = %path.display(), "ignoring creation of excluded directory");
                return;
            }
            self.emit(ChangeKind::Created, &path).await;
            match self.registry.discover_subtree(&path) {
                Ok(Some(_)) => {
                    self.stats.subtrees_discovered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(error) => {
                    error!(
                        path = %path.display(),
                        error = %error,
                        "failed to register newly created subtree"
                    );
                }
            }
        } else {
            self.emit(ChangeKind::Created, &path).await;
            self.cache
                .insert(path.clone(), FileFingerprint::capture(&path));
        }
    }

    async fn on_deleted(&self, path: PathBuf) {
        if self.is_own_log(&path) {
            return;
        }
        self.emit(ChangeKind::Deleted, &path).await;
        self.cache.remove(&path);
    }

    /// Record a file modification unless its fingerprint matches the last
    /// recorded one. A path never seen before counts as a first observation
    /// and is recorded; files predating the monitor enter the cache here.
    async fn on_modified(&self, path: PathBuf, is_dir: bool) {
        if is_dir || self.is_own_log(&path) {
            return;
        }
        let fingerprint = FileFingerprint::capture(&path);
        if self.cache.get(&path) == Some(fingerprint) {
            self.stats.modifies_suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "suppressed repeated modification");
            return;
        }
        self.cache.insert(path.clone(), fingerprint);
        self.emit(ChangeKind::Modified, &path).await;
    }

    /// Record a move under its destination path and carry the cached
    /// fingerprint across the rename.
    async fn on_moved(&self, from: PathBuf, to: PathBuf, is_dir: bool) {
        if self.is_own_log(&from) || self.is_own_log(&to) {
            return;
        }
        self.emit(ChangeKind::Moved, &to).await;
        if !is_dir {
            self.cache.rename(&from, to);
        }
    }

    /// Hand a surviving change to the log of the registration owning `path`.
    async fn emit(&self, kind: ChangeKind, path: &Path) {
        let Some(owner) = self.registry.owner_of(path) else {
            warn!(path = %path.display(), "no registration owns event path");
            self.stats.events_unrouted.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let record = ChangeRecord::new(kind, path.to_path_buf());
        self.recorder.record(&owner, &record).await;
    }

    /// Whether `path` is the log file of the registration that owns it.
    fn is_own_log(&self, path: &Path) -> bool {
        self.registry
            .owner_of(path)
            .is_some_and(|registration| registration.log_path == *path)
    }
}
