//! Watch source abstraction and the notify-backed implementation.
//!
//! [`WatchSource`] is the seam between the registry and the platform
//! notification backend: registration and unregistration of paths, nothing
//! else. Events flow out-of-band through the channel handed to
//! [`NotifyWatchSource::new`], already normalized to [`RawEvent`]s.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::WatchError;
use crate::watcher::events::RawEvent;

/// How long an unmatched rename source is held before it is treated as a
/// departure from the watched tree.
const RENAME_PAIR_WINDOW: Duration = Duration::from_secs(1);

/// Registration surface of a notification backend.
///
/// Implementations deliver events through their own channel; this trait only
/// controls which paths produce them.
pub trait WatchSource: Send {
    /// Start watching `path`, recursively or for direct children only.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RegisterFailed`] when the backend rejects the
    /// path.
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), WatchError>;

    /// Stop watching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::UnregisterFailed`] when the backend rejects the
    /// path.
    fn unregister(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// A rename source waiting for its destination half.
#[derive(Debug)]
struct PendingRename {
    tracker: Option<usize>,
    path: PathBuf,
    parked_at: Instant,
}

/// Turns backend events into [`RawEvent`]s.
///
/// The interesting part is rename pairing. Backends disagree on how a move
/// is reported: inotify sends a source event, a destination event, and a
/// combined event carrying both paths; Windows sends only source and
/// destination; FSEvents sends two indeterminate rename events. The
/// normalizer parks a source until its destination arrives, pairs by
/// tracker id when both sides carry one, and treats a source whose
/// destination never shows up as a departure from the watched tree.
#[derive(Debug, Default)]
struct EventNormalizer {
    pending: Option<PendingRename>,
    /// Last move produced by pairing, used to drop the combined event some
    /// backends send after the two halves.
    last_move: Option<(PathBuf, PathBuf)>,
    window: Option<Duration>,
}

impl EventNormalizer {
    fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_window(window: Duration) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    fn window(&self) -> Duration {
        self.window.unwrap_or(RENAME_PAIR_WINDOW)
    }

    /// Normalize one backend event into zero or more raw events.
    fn normalize(&mut self, event: Event) -> Vec<RawEvent> {
        let mut out = Vec::new();
        self.flush_stale(&mut out);

        match event.kind {
            EventKind::Create(kind) => {
                for path in event.paths {
                    let is_dir = match kind {
                        CreateKind::Folder => true,
                        CreateKind::File => false,
                        CreateKind::Any | CreateKind::Other => path.is_dir(),
                    };
                    out.push(RawEvent::Created { path, is_dir });
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    out.push(RawEvent::Deleted { path });
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.normalize_rename(mode, event, &mut out);
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    let is_dir = path.is_dir();
                    out.push(RawEvent::Modified { path, is_dir });
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
        out
    }

    fn normalize_rename(&mut self, mode: RenameMode, event: Event, out: &mut Vec<RawEvent>) {
        let tracker = event.attrs.tracker();
        match mode {
            RenameMode::From => {
                let Some(path) = event.paths.into_iter().next() else {
                    return;
                };
                self.park(tracker, path, out);
            }
            RenameMode::To => {
                let Some(path) = event.paths.into_iter().next() else {
                    return;
                };
                self.resolve_destination(tracker, path, out);
            }
            RenameMode::Both => {
                let mut paths = event.paths.into_iter();
                let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                    return;
                };
                // The combined event repeats a pair we already emitted.
                if self.last_move.take() == Some((from.clone(), to.clone())) {
                    return;
                }
                if self
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.path == from)
                {
                    self.pending = None;
                }
                let is_dir = to.is_dir();
                out.push(RawEvent::Moved { from, to, is_dir });
            }
            RenameMode::Any => {
                // FSEvents does not say which side of the rename this is;
                // a path that still exists is the destination.
                let Some(path) = event.paths.into_iter().next() else {
                    return;
                };
                if path.exists() {
                    self.resolve_destination(tracker, path, out);
                } else {
                    self.park(tracker, path, out);
                }
            }
            RenameMode::Other => {}
        }
    }

    /// Hold a rename source until its destination arrives. A source already
    /// parked means its destination never came; report it as a departure.
    fn park(&mut self, tracker: Option<usize>, path: PathBuf, out: &mut Vec<RawEvent>) {
        if let Some(stale) = self.pending.take() {
            out.push(RawEvent::Deleted { path: stale.path });
        }
        self.pending = Some(PendingRename {
            tracker,
            path,
            parked_at: Instant::now(),
        });
    }

    /// Pair a rename destination with the parked source, or treat it as an
    /// arrival from outside the watched tree.
    fn resolve_destination(
        &mut self,
        tracker: Option<usize>,
        to: PathBuf,
        out: &mut Vec<RawEvent>,
    ) {
        let paired = match (&self.pending, tracker) {
            (Some(pending), Some(id)) => pending.tracker.is_none() || pending.tracker == Some(id),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if paired {
            let Some(pending) = self.pending.take() else {
                return;
            };
            let is_dir = to.is_dir();
            self.last_move = Some((pending.path.clone(), to.clone()));
            out.push(RawEvent::Moved {
                from: pending.path,
                to,
                is_dir,
            });
        } else {
            if let Some(stale) = self.pending.take() {
                out.push(RawEvent::Deleted { path: stale.path });
            }
            let is_dir = to.is_dir();
            out.push(RawEvent::Created { path: to, is_dir });
        }
    }

    /// Expire a parked rename source whose pair window has elapsed.
    fn flush_stale(&mut self, out: &mut Vec<RawEvent>) {
        let window = self.window();
        match self.pending.take() {
            Some(pending) if pending.parked_at.elapsed() > window => {
                out.push(RawEvent::Deleted { path: pending.path });
            }
            other => self.pending = other,
        }
    }
}

/// [`WatchSource`] backed by the platform's recommended notify watcher.
pub struct NotifyWatchSource {
    watcher: RecommendedWatcher,
}

impl NotifyWatchSource {
    /// Create a watch source that sends normalized events to `events`.
    ///
    /// The backend delivers on its own thread; sending on an unbounded
    /// channel keeps that thread from ever blocking on the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Backend`] when the platform watcher cannot be
    /// initialized.
    pub fn new(events: mpsc::UnboundedSender<RawEvent>) -> Result<Self, WatchError> {
        let mut normalizer = EventNormalizer::new();
        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for raw in normalizer.normalize(event) {
                        if events.send(raw).is_err() {
                            // Receiver dropped during shutdown; nothing left
                            // to deliver to.
                            break;
                        }
                    }
                }
                Err(error) => {
                    warn!(error = %error, "watch backend reported an error");
                }
            },
            notify::Config::default(),
        )
        .map_err(|error| WatchError::Backend(error.to_string()))?;

        Ok(Self { watcher })
    }
}

impl WatchSource for NotifyWatchSource {
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), WatchError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher
            .watch(path, mode)
            .map_err(|error| WatchError::register(path.display().to_string(), error))
    }

    fn unregister(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watcher
            .unwatch(path)
            .map_err(|error| WatchError::unregister(path.display().to_string(), error))
    }
}

/// Test double that records registration calls instead of watching anything.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingSource {
    pub(crate) registered: std::sync::Arc<parking_lot::Mutex<Vec<(PathBuf, bool)>>>,
    pub(crate) unregistered: std::sync::Arc<parking_lot::Mutex<Vec<PathBuf>>>,
    pub(crate) fail_register_on: Option<PathBuf>,
}

#[cfg(test)]
impl WatchSource for RecordingSource {
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), WatchError> {
        if self.fail_register_on.as_deref() == Some(path) {
            return Err(WatchError::register(
                path.display().to_string(),
                "induced failure",
            ));
        }
        self.registered.lock().push((path.to_path_buf(), recursive));
        Ok(())
    }

    fn unregister(&mut self, path: &Path) -> Result<(), WatchError> {
        self.unregistered.lock().push(path.to_path_buf());
        Ok(())
    }
}
