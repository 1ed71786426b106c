//! Midnight-driven log backup.
//!
//! Once per calendar day, every registered subtree's log is copied whole
//! into a dated file under the backup directory next to the subtree. The
//! scheduler never touches the live logs beyond reading them; appends going
//! on during a copy at worst miss the final lines of that day's backup.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{BACKUP_DATE_FORMAT, BACKUP_DIR_NAME};
use crate::error::ArchiveError;
use crate::session::MonitorStats;
use crate::watcher::{WatchRegistration, WatchRegistry};

/// Fallback wait when the next midnight cannot be represented.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Copies every registration's log into a dated backup once per day.
pub struct BackupScheduler {
    registry: Arc<WatchRegistry>,
    root: PathBuf,
    stats: Arc<MonitorStats>,
}

impl BackupScheduler {
    /// Create a scheduler over the session's registry.
    #[must_use]
    pub fn new(registry: Arc<WatchRegistry>, root: PathBuf, stats: Arc<MonitorStats>) -> Self {
        Self {
            registry,
            root,
            stats,
        }
    }

    /// Sleep until each local midnight and archive all logs, until
    /// cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("backup scheduler started");
        loop {
            let wait = duration_until_next_midnight(Local::now());
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => self.archive_all().await,
            }
        }
        info!("backup scheduler stopped");
    }

    /// Archive every currently registered log under today's date.
    ///
    /// A failing copy is reported and skipped; the remaining logs are still
    /// archived. Running twice on the same date overwrites that date's
    /// backups.
    pub async fn archive_all(&self) {
        self.stats.archive_runs.fetch_add(1, Ordering::Relaxed);
        let date = Local::now().format(BACKUP_DATE_FORMAT).to_string();

        let mut archived = 0u64;
        let mut failed = 0u64;
        for registration in self.registry.registrations() {
            match self.archive_log(&registration, &date).await {
                Ok(backup) => {
                    debug!(
                        log = %registration.log_path.display(),
                        backup = %backup.display(),
                        "archived log"
                    );
                    archived += 1;
                }
                Err(archive_error) => {
                    error!(
                        log = %registration.log_path.display(),
                        error = %archive_error,
                        "failed to archive log"
                    );
                    self.stats.archive_failures.fetch_add(1, Ordering::Relaxed);
                    failed += 1;
                }
            }
        }
        info!(archived, failed, date = %date, "daily log archival complete");
    }

    /// Copy one registration's log into `<backup dir>/<log name>_backup_<date>.csv`.
    async fn archive_log(
        &self,
        registration: &WatchRegistration,
        date: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let backup_dir = self.backup_dir(registration);
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|error| ArchiveError::BackupDir {
                dir: backup_dir.display().to_string(),
                reason: error.to_string(),
            })?;

        let log_name = registration.log_path.file_name().map_or_else(
            || "log.csv".to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        let backup_path = backup_dir.join(format!("{log_name}_backup_{date}.csv"));

        tokio::fs::copy(&registration.log_path, &backup_path)
            .await
            .map_err(|error| ArchiveError::CopyFailed {
                log: registration.log_path.display().to_string(),
                reason: error.to_string(),
            })?;
        Ok(backup_path)
    }

    /// Backup directory for a registration: next to the subtree, except for
    /// the monitored root itself, whose backups stay inside the tree.
    fn backup_dir(&self, registration: &WatchRegistration) -> PathBuf {
        if registration.root == self.root {
            registration.root.join(BACKUP_DIR_NAME)
        } else {
            registration
                .root
                .parent()
                .unwrap_or(&registration.root)
                .join(BACKUP_DIR_NAME)
        }
    }
}

/// Time to wait from `now` until the next local midnight.
fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    now.date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(FALLBACK_INTERVAL)
}
