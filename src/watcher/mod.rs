//! File system watching and change recording.
//!
//! This module provides:
//! - Watch registration over a root and its discovered subtrees
//! - Normalization of platform notifications into raw events
//! - Fingerprint-based suppression of repeated modifications
//! - Append-only CSV change logs, one per subtree

mod cache;
mod detector;
mod events;
mod fingerprint;
mod recorder;
mod registry;
mod source;

pub use cache::MetadataCache;
pub use detector::ChangeDetector;
pub use events::{host_name, ChangeKind, ChangeRecord, RawEvent, TIMESTAMP_FORMAT};
pub use fingerprint::FileFingerprint;
pub use recorder::{ensure_log_file, EventRecorder, LOG_HEADER};
pub use registry::{ExclusionSet, WatchRegistration, WatchRegistry};
pub use source::{NotifyWatchSource, WatchSource};

#[cfg(test)]
pub(crate) use source::RecordingSource;
