//! Daily log archival.

mod scheduler;

pub use scheduler::BackupScheduler;

/// Directory the dated log copies are placed in.
pub const BACKUP_DIR_NAME: &str = "log_backup";

/// Date suffix format of backup file names.
pub const BACKUP_DATE_FORMAT: &str = "%Y-%m-%d";
