//! File fingerprints for suppressing duplicate modification events.
//!
//! Editors and copy tools fire several modification notifications for one
//! logical save. A fingerprint of size plus modification time is enough to
//! tell a repeat apart from a real change without hashing file content.

use std::path::Path;
use std::time::SystemTime;

/// Size and mtime snapshot of a file at observation time.
///
/// Either field may be unavailable (file vanished between the event and the
/// stat, or the platform withholds mtime); an absent fingerprint never
/// equals a present one, so such events are still recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFingerprint {
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl FileFingerprint {
    /// Fingerprint of a file that could not be observed.
    pub const ABSENT: Self = Self {
        size: None,
        modified: None,
    };

    /// Stat `path` and capture its current fingerprint.
    ///
    /// Returns [`Self::ABSENT`] when the file cannot be stat'd, which is
    /// routine for short-lived temporary files.
    #[must_use]
    pub fn capture(path: &Path) -> Self {
        std::fs::metadata(path).map_or(Self::ABSENT, |meta| Self {
            size: Some(meta.len()),
            modified: meta.modified().ok(),
        })
    }

    /// Whether this fingerprint carries no observation at all.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        self.size.is_none() && self.modified.is_none()
    }
}
