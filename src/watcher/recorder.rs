//! Append-only CSV change logs.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::error;

use crate::session::MonitorStats;
use crate::watcher::events::ChangeRecord;
use crate::watcher::registry::WatchRegistration;

/// Header line of every change log.
pub const LOG_HEADER: &str = "Timestamp,Event Type,Path,Computer Name";

/// Create `path` with the standard header unless it already exists.
///
/// An existing log is left untouched, so re-registration of a subtree never
/// clobbers history.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be created or the
/// header cannot be written.
pub fn ensure_log_file(path: &Path) -> std::io::Result<()> {
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            file.write_all(LOG_HEADER.as_bytes())?;
            file.write_all(b"\n")
        }
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(error) => Err(error),
    }
}

/// Appends change records to their subtree's log.
///
/// Each append opens, writes, and closes the log, so the daily archiver can
/// copy a log at any moment and always sees complete lines.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    stats: Arc<MonitorStats>,
}

impl EventRecorder {
    /// Create a recorder reporting into `stats`.
    #[must_use]
    pub fn new(stats: Arc<MonitorStats>) -> Self {
        Self { stats }
    }

    /// Append `record` to the log of `registration`.
    ///
    /// A failed append is reported and the record dropped; one bad write
    /// must not stop the monitor. A log deleted out from under us is
    /// recreated, headerless, rather than losing subsequent records.
    pub async fn record(&self, registration: &WatchRegistration, record: &ChangeRecord) {
        let line = record.to_csv_line();
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&registration.log_path)
                .await?;
            file.write_all(line.as_bytes()).await
        }
        .await;

        match result {
            Ok(()) => {
                self.stats.records_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                error!(
                    log = %registration.log_path.display(),
                    error = %error,
                    "failed to append change record"
                );
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
