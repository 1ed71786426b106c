//! File system event types.
//!
//! `RawEvent` is what a watch source delivers: the four notification kinds
//! with their paths and an is-directory flag, before any policy is applied.
//! `ChangeRecord` is what survives the detector: a normalized, immutable
//! audit entry carrying timestamp, kind, path, and originating host.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;

/// Timestamp format used in log records (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Host identifier stamped on every record, resolved once per process.
static HOST_NAME: Lazy<String> = Lazy::new(|| {
    hostname::get().map_or_else(
        |_| "unknown".to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
});

/// The host identifier used for this process.
#[must_use]
pub fn host_name() -> &'static str {
    &HOST_NAME
}

/// Raw notification from a watch source, before dedup and exclusion policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A file or directory appeared.
    Created { path: PathBuf, is_dir: bool },
    /// A file or directory changed. Directory modifications are noise and
    /// are dropped by the detector.
    Modified { path: PathBuf, is_dir: bool },
    /// A file or directory disappeared.
    Deleted { path: PathBuf },
    /// A file or directory was renamed or moved within the watched tree.
    Moved {
        from: PathBuf,
        to: PathBuf,
        is_dir: bool,
    },
}

impl RawEvent {
    /// The path this event is primarily about (the destination for moves).
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        match self {
            Self::Created { path, .. } | Self::Modified { path, .. } | Self::Deleted { path } => {
                path
            }
            Self::Moved { to, .. } => to,
        }
    }
}

/// The kind of a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
    Moved,
}

impl ChangeKind {
    /// The lowercase word used in log records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized change, immutable once produced.
///
/// For moves the recorded path is the destination, not the source.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Local>,
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub host: String,
}

impl ChangeRecord {
    /// Create a record stamped with the current time and this process's
    /// host identifier.
    #[must_use]
    pub fn new(kind: ChangeKind, path: PathBuf) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            path,
            host: host_name().to_string(),
        }
    }

    /// Render the record as one CSV line, newline-terminated.
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.kind,
            csv_field(&self.path.to_string_lossy()),
            csv_field(&self.host),
        )
    }
}

/// Quote a CSV field only when it needs it (embedded comma, quote, or
/// newline); embedded quotes are doubled.
fn csv_field(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_record(kind: ChangeKind, path: &str) -> ChangeRecord {
        ChangeRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 1, 14, 30, 5).unwrap(),
            kind,
            path: PathBuf::from(path),
            host: "build-host".to_string(),
        }
    }

    #[test]
    fn test_change_kind_words() {
        assert_eq!(ChangeKind::Created.as_str(), "created");
        assert_eq!(ChangeKind::Deleted.as_str(), "deleted");
        assert_eq!(ChangeKind::Modified.as_str(), "modified");
        assert_eq!(ChangeKind::Moved.as_str(), "moved");
    }

    #[test]
    fn test_csv_line_format() {
        let record = fixed_record(ChangeKind::Created, "/data/sub/a.txt");
        assert_eq!(
            record.to_csv_line(),
            "2024-03-01 14:30:05,created,/data/sub/a.txt,build-host\n"
        );
    }

    #[test]
    fn test_csv_line_quotes_commas_in_path() {
        let record = fixed_record(ChangeKind::Modified, "/data/sub/report, final.txt");
        assert_eq!(
            record.to_csv_line(),
            "2024-03-01 14:30:05,modified,\"/data/sub/report, final.txt\",build-host\n"
        );
    }

    #[test]
    fn test_csv_field_doubles_quotes() {
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_primary_path_is_move_destination() {
        let event = RawEvent::Moved {
            from: PathBuf::from("/data/a.txt"),
            to: PathBuf::from("/data/b.txt"),
            is_dir: false,
        };
        assert_eq!(event.primary_path(), Path::new("/data/b.txt"));
    }

    #[test]
    fn test_record_new_uses_process_host() {
        let record = ChangeRecord::new(ChangeKind::Deleted, PathBuf::from("/data/x"));
        assert_eq!(record.host, host_name());
        assert_eq!(record.kind, ChangeKind::Deleted);
    }
}
