//! Monitoring session lifecycle.
//!
//! A [`Session`] ties the pieces together: it bootstraps the registry over
//! the configured root, runs the detector loop that drains the watch
//! source's channel, and runs the daily backup scheduler. Dropping watches
//! and joining both tasks happens in [`Session::shutdown`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::archive::{BackupScheduler, BACKUP_DIR_NAME};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::watcher::{
    ChangeDetector, EventRecorder, ExclusionSet, MetadataCache, RawEvent, WatchRegistry,
    WatchSource,
};

/// Counters for a monitoring session.
#[derive(Debug, Default)]
pub struct MonitorStats {
    pub events_seen: AtomicU64,
    pub records_written: AtomicU64,
    pub modifies_suppressed: AtomicU64,
    pub subtrees_discovered: AtomicU64,
    pub events_unrouted: AtomicU64,
    pub write_errors: AtomicU64,
    pub archive_runs: AtomicU64,
    pub archive_failures: AtomicU64,
}

impl MonitorStats {
    /// Create a new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current counters.
    #[must_use]
    pub fn snapshot(&self) -> MonitorStatsSnapshot {
        MonitorStatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            modifies_suppressed: self.modifies_suppressed.load(Ordering::Relaxed),
            subtrees_discovered: self.subtrees_discovered.load(Ordering::Relaxed),
            events_unrouted: self.events_unrouted.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            archive_runs: self.archive_runs.load(Ordering::Relaxed),
            archive_failures: self.archive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of session counters.
#[derive(Debug, Clone, Copy)]
pub struct MonitorStatsSnapshot {
    pub events_seen: u64,
    pub records_written: u64,
    pub modifies_suppressed: u64,
    pub subtrees_discovered: u64,
    pub events_unrouted: u64,
    pub write_errors: u64,
    pub archive_runs: u64,
    pub archive_failures: u64,
}

/// A running monitoring session.
pub struct Session {
    registry: Arc<WatchRegistry>,
    cache: MetadataCache,
    stats: Arc<MonitorStats>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start monitoring per `config`, consuming raw events from `events`.
    ///
    /// `source` must be the producer feeding `events`. The root's backup
    /// directory is added to the exclusions so the archiver's output never
    /// becomes a watched subtree. On return the root and its existing
    /// subtrees are registered and both background tasks are running.
    ///
    /// # Errors
    ///
    /// Returns an error when the monitored root cannot be registered.
    pub fn start(
        config: &Config,
        source: Box<dyn WatchSource>,
        mut events: mpsc::UnboundedReceiver<RawEvent>,
    ) -> Result<Self> {
        let mut exclusions = ExclusionSet::new(config.exclude.iter().cloned());
        exclusions.insert(config.root.join(BACKUP_DIR_NAME));

        let registry = Arc::new(WatchRegistry::new(source, exclusions));
        registry.bootstrap(&config.root)?;

        let cache = MetadataCache::new();
        let stats = MonitorStats::new();
        let cancel = CancellationToken::new();

        let detector = ChangeDetector::new(
            cache.clone(),
            Arc::clone(&registry),
            EventRecorder::new(Arc::clone(&stats)),
            Arc::clone(&stats),
        );
        let detector_cancel = cancel.clone();
        let detector_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => detector.handle_event(event).await,
                        None => {
                            info!("event channel closed, stopping detector");
                            break;
                        }
                    },
                    () = detector_cancel.cancelled() => break,
                }
            }
        });

        let scheduler = BackupScheduler::new(
            Arc::clone(&registry),
            config.root.clone(),
            Arc::clone(&stats),
        );
        let scheduler_cancel = cancel.clone();
        let scheduler_handle = tokio::spawn(async move {
            scheduler.run(scheduler_cancel).await;
        });

        info!(
            root = %config.root.display(),
            subtrees = registry.len(),
            "monitoring session started"
        );

        Ok(Self {
            registry,
            cache,
            stats,
            cancel,
            handles: vec![detector_handle, scheduler_handle],
        })
    }

    /// Shared registry handle.
    #[must_use]
    pub fn registry(&self) -> Arc<WatchRegistry> {
        Arc::clone(&self.registry)
    }

    /// Shared fingerprint cache handle.
    #[must_use]
    pub fn cache(&self) -> MetadataCache {
        self.cache.clone()
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    /// Request the session to stop without waiting for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop both background tasks, wait for them, and drop all watches.
    ///
    /// # Errors
    ///
    /// Returns an error when a background task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle
                .await
                .map_err(|error| Error::internal(format!("background task failed: {error}")))?;
        }
        self.registry.unregister_all();

        let snapshot = self.stats.snapshot();
        info!(
            events = snapshot.events_seen,
            records = snapshot.records_written,
            suppressed = snapshot.modifies_suppressed,
            discovered = snapshot.subtrees_discovered,
            "monitoring session stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::RecordingSource;
    use std::path::PathBuf;
    use std::time::Duration;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    fn test_config(root: PathBuf) -> Config {
        Config {
            root,
            exclude: Vec::new(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_stats_snapshot_starts_at_zero() {
        let stats = MonitorStats::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_seen, 0);
        assert_eq!(snapshot.records_written, 0);
        assert_eq!(snapshot.archive_runs, 0);
    }

    #[tokio::test]
    async fn test_session_records_event_and_shuts_down() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let source = RecordingSource::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let session =
            Session::start(&test_config(tmp.path().to_path_buf()), Box::new(source.clone()), rx)
                .unwrap();

        let file = sub.join("a.txt");
        std::fs::write(&file, b"payload").unwrap();
        tx.send(RawEvent::Created {
            path: file,
            is_dir: false,
        })
        .unwrap();

        let stats = session.stats();
        wait_until(|| stats.snapshot().records_written == 1).await;

        session.shutdown().await.unwrap();
        assert_eq!(source.unregistered.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_backup_directory_is_excluded() {
        let tmp = tempfile::tempdir().unwrap();

        let source = RecordingSource::default();
        let (_tx, rx) = mpsc::unbounded_channel();
        let session = Session::start(
            &test_config(tmp.path().to_path_buf()),
            Box::new(source),
            rx,
        )
        .unwrap();

        let registry = session.registry();
        assert!(registry.is_excluded(&tmp.path().join(BACKUP_DIR_NAME)));
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_stops_detector() {
        let tmp = tempfile::tempdir().unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::start(
            &test_config(tmp.path().to_path_buf()),
            Box::new(RecordingSource::default()),
            rx,
        )
        .unwrap();

        drop(tx);
        // Detector exits on its own; shutdown still joins cleanly.
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.shutdown().await.unwrap();
    }
}
