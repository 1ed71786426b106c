//! Integration tests for the monitoring session.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fsaudit::archive::{BackupScheduler, BACKUP_DATE_FORMAT, BACKUP_DIR_NAME};
use fsaudit::error::WatchError;
use fsaudit::session::Session;
use fsaudit::watcher::{RawEvent, WatchRegistration, WatchSource, LOG_HEADER};
use fsaudit::Config;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Watch source stand-in: registrations are recorded, events are injected
/// through the session's channel by the test itself.
#[derive(Debug, Default, Clone)]
struct ScriptedSource {
    registered: Arc<Mutex<Vec<(PathBuf, bool)>>>,
    unregistered: Arc<Mutex<Vec<PathBuf>>>,
}

impl WatchSource for ScriptedSource {
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), WatchError> {
        self.registered.lock().push((path.to_path_buf(), recursive));
        Ok(())
    }

    fn unregister(&mut self, path: &Path) -> Result<(), WatchError> {
        self.unregistered.lock().push(path.to_path_buf());
        Ok(())
    }
}

fn config_for(root: &Path) -> Config {
    Config {
        root: root.to_path_buf(),
        exclude: Vec::new(),
        log_level: "info".to_string(),
    }
}

type Harness = (
    TempDir,
    Session,
    mpsc::UnboundedSender<RawEvent>,
    ScriptedSource,
);

fn start_session(subdirs: &[&str]) -> Harness {
    let tmp = TempDir::new().unwrap();
    for sub in subdirs {
        fs::create_dir(tmp.path().join(sub)).unwrap();
    }
    let source = ScriptedSource::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::start(&config_for(tmp.path()), Box::new(source.clone()), rx).unwrap();
    (tmp, session, tx, source)
}

/// Read a directory's log, waiting until it holds at least `want` lines.
async fn wait_for_lines(dir: &Path, want: usize) -> Vec<String> {
    let log = WatchRegistration::log_path_for(dir);
    for _ in 0..200 {
        if let Ok(content) = fs::read_to_string(&log) {
            let lines: Vec<String> = content.lines().map(ToString::to_string).collect();
            if lines.len() >= want {
                return lines;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "log {} did not reach {} lines in time",
        log.display(),
        want
    );
}

/// Test that the startup scan registers the root and each existing subtree.
#[tokio::test]
async fn test_startup_scan_registers_existing_subtrees() {
    let (tmp, session, _tx, source) = start_session(&["alpha", "beta"]);
    fs::write(tmp.path().join("loose.txt"), b"not a directory").unwrap();

    {
        let registered = source.registered.lock();
        assert_eq!(registered.len(), 3);
        assert!(registered.contains(&(tmp.path().to_path_buf(), false)));
        assert!(registered.contains(&(tmp.path().join("alpha"), true)));
        assert!(registered.contains(&(tmp.path().join("beta"), true)));
    }

    for dir in [
        tmp.path().to_path_buf(),
        tmp.path().join("alpha"),
        tmp.path().join("beta"),
    ] {
        let content = fs::read_to_string(WatchRegistration::log_path_for(&dir)).unwrap();
        assert_eq!(content, format!("{LOG_HEADER}\n"));
    }

    session.shutdown().await.unwrap();
}

/// Test the full lifecycle of one file inside a subtree: create, spurious
/// modify, real modify, delete.
#[tokio::test]
async fn test_file_lifecycle_recorded_in_subtree_log() {
    let (tmp, session, tx, _source) = start_session(&["sub"]);
    let sub = tmp.path().join("sub");
    let file = sub.join("a.txt");

    fs::write(&file, b"v1").unwrap();
    tx.send(RawEvent::Created {
        path: file.clone(),
        is_dir: false,
    })
    .unwrap();
    let lines = wait_for_lines(&sub, 2).await;
    assert!(lines[1].contains(",created,"));

    // Spurious notification: nothing on disk changed, so no row.
    tx.send(RawEvent::Modified {
        path: file.clone(),
        is_dir: false,
    })
    .unwrap();

    // Real change: the fingerprint differs, so a row lands.
    fs::write(&file, b"version two").unwrap();
    tx.send(RawEvent::Modified {
        path: file.clone(),
        is_dir: false,
    })
    .unwrap();
    let lines = wait_for_lines(&sub, 3).await;
    assert!(lines[2].contains(",modified,"));

    fs::remove_file(&file).unwrap();
    tx.send(RawEvent::Deleted { path: file.clone() }).unwrap();
    let lines = wait_for_lines(&sub, 4).await;
    assert!(lines[3].contains(",deleted,"));

    // Exactly one modified row: the spurious notification left no trace.
    let modified = lines.iter().filter(|l| l.contains(",modified,")).count();
    assert_eq!(modified, 1);
    assert_eq!(session.stats().snapshot().modifies_suppressed, 1);

    session.shutdown().await.unwrap();
}

/// Test that a directory created at runtime is logged to its parent's log
/// and then gets its own registration and log.
#[tokio::test]
async fn test_new_directory_registered_live() {
    let (tmp, session, tx, source) = start_session(&[]);
    let fresh = tmp.path().join("fresh");
    fs::create_dir(&fresh).unwrap();

    tx.send(RawEvent::Created {
        path: fresh.clone(),
        is_dir: true,
    })
    .unwrap();

    let root_lines = wait_for_lines(tmp.path(), 2).await;
    assert!(root_lines[1].contains(",created,"));
    assert!(root_lines[1].contains("fresh"));

    // Registration happened: the subtree's log exists and the source saw a
    // recursive watch request.
    let lines = wait_for_lines(&fresh, 1).await;
    assert_eq!(lines[0], LOG_HEADER);
    assert!(source
        .registered
        .lock()
        .contains(&(fresh.clone(), true)));

    // Files under the new subtree route to its own log, not the root's.
    let file = fresh.join("inside.txt");
    fs::write(&file, b"x").unwrap();
    tx.send(RawEvent::Created {
        path: file,
        is_dir: false,
    })
    .unwrap();
    let lines = wait_for_lines(&fresh, 2).await;
    assert!(lines[1].contains("inside.txt"));
    assert_eq!(fs::read_to_string(WatchRegistration::log_path_for(tmp.path()))
        .unwrap()
        .lines()
        .count(), 2);

    session.shutdown().await.unwrap();
}

/// Test that discovery is idempotent when the same directory creation is
/// delivered twice.
#[tokio::test]
async fn test_duplicate_directory_creation_is_harmless() {
    let (tmp, session, tx, source) = start_session(&[]);
    let fresh = tmp.path().join("fresh");
    fs::create_dir(&fresh).unwrap();

    for _ in 0..2 {
        tx.send(RawEvent::Created {
            path: fresh.clone(),
            is_dir: true,
        })
        .unwrap();
    }

    // Both deliveries log a created row to the parent, but only one
    // registration and one log header exist.
    wait_for_lines(tmp.path(), 3).await;
    let registered = source
        .registered
        .lock()
        .iter()
        .filter(|(path, _)| path == &fresh)
        .count();
    assert_eq!(registered, 1);
    let lines = wait_for_lines(&fresh, 1).await;
    assert_eq!(lines.len(), 1);

    session.shutdown().await.unwrap();
}

/// Test that an excluded directory is neither registered nor logged.
#[tokio::test]
async fn test_excluded_directory_ignored() {
    let tmp = TempDir::new().unwrap();
    let skip = tmp.path().join("skip");
    let source = ScriptedSource::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let config = Config {
        root: tmp.path().to_path_buf(),
        exclude: vec![skip.clone()],
        log_level: "info".to_string(),
    };
    let session = Session::start(&config, Box::new(source.clone()), rx).unwrap();

    fs::create_dir(&skip).unwrap();
    tx.send(RawEvent::Created {
        path: skip.clone(),
        is_dir: true,
    })
    .unwrap();

    // Sentinel event so we know the excluded one was processed.
    fs::write(tmp.path().join("sentinel.txt"), b"x").unwrap();
    tx.send(RawEvent::Created {
        path: tmp.path().join("sentinel.txt"),
        is_dir: false,
    })
    .unwrap();

    let lines = wait_for_lines(tmp.path(), 2).await;
    assert!(lines[1].contains("sentinel.txt"));
    assert!(!lines.iter().any(|line| line.contains("skip")));
    assert!(!skip.join("log_skip.csv").exists());
    assert!(!source
        .registered
        .lock()
        .iter()
        .any(|(path, _)| path == &skip));

    session.shutdown().await.unwrap();
}

/// Test that a moved file is recorded under its destination and keeps its
/// fingerprint, so an unchanged-file notification after the move stays
/// suppressed.
#[tokio::test]
async fn test_move_carries_fingerprint() {
    let (tmp, session, tx, _source) = start_session(&["sub"]);
    let sub = tmp.path().join("sub");
    let old = sub.join("old.txt");
    let new = sub.join("new.txt");

    fs::write(&old, b"payload").unwrap();
    tx.send(RawEvent::Created {
        path: old.clone(),
        is_dir: false,
    })
    .unwrap();
    wait_for_lines(&sub, 2).await;

    fs::rename(&old, &new).unwrap();
    tx.send(RawEvent::Moved {
        from: old,
        to: new.clone(),
        is_dir: false,
    })
    .unwrap();
    let lines = wait_for_lines(&sub, 3).await;
    assert!(lines[2].contains(",moved,"));
    assert!(lines[2].contains("new.txt"));

    tx.send(RawEvent::Modified {
        path: new,
        is_dir: false,
    })
    .unwrap();
    fs::write(sub.join("sentinel.txt"), b"y").unwrap();
    tx.send(RawEvent::Created {
        path: sub.join("sentinel.txt"),
        is_dir: false,
    })
    .unwrap();

    let lines = wait_for_lines(&sub, 4).await;
    assert!(!lines.iter().any(|line| line.contains(",modified,")));
    assert_eq!(session.stats().snapshot().modifies_suppressed, 1);

    session.shutdown().await.unwrap();
}

/// Test a full archival cycle, including the same-day overwrite.
#[tokio::test]
async fn test_archival_overwrites_same_day() {
    let (tmp, session, tx, _source) = start_session(&["sub"]);
    let sub = tmp.path().join("sub");
    let file = sub.join("a.txt");

    fs::write(&file, b"v1").unwrap();
    tx.send(RawEvent::Created {
        path: file.clone(),
        is_dir: false,
    })
    .unwrap();
    wait_for_lines(&sub, 2).await;

    let scheduler = BackupScheduler::new(
        session.registry(),
        tmp.path().to_path_buf(),
        session.stats(),
    );
    scheduler.archive_all().await;

    let date = chrono::Local::now().format(BACKUP_DATE_FORMAT).to_string();
    let backup_dir = tmp.path().join(BACKUP_DIR_NAME);
    let backup = backup_dir.join(format!("log_sub.csv_backup_{date}.csv"));
    let first = fs::read_to_string(&backup).unwrap();
    assert!(first.contains(",created,"));

    // More activity, then a second run the same day: the backup is
    // replaced, not appended to.
    fs::write(&file, b"version two").unwrap();
    tx.send(RawEvent::Modified {
        path: file,
        is_dir: false,
    })
    .unwrap();
    wait_for_lines(&sub, 3).await;
    scheduler.archive_all().await;

    let second = fs::read_to_string(&backup).unwrap();
    assert!(second.contains(",modified,"));
    assert_eq!(
        second,
        fs::read_to_string(WatchRegistration::log_path_for(&sub)).unwrap()
    );

    // One backup per log; the root's log is archived alongside.
    assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), 2);
    assert_eq!(session.stats().snapshot().archive_runs, 2);

    session.shutdown().await.unwrap();
}

/// Test that shutdown unregisters every watch and leaves only well-formed
/// log lines behind.
#[tokio::test]
async fn test_shutdown_unregisters_and_logs_stay_well_formed() {
    let (tmp, session, tx, source) = start_session(&["alpha", "beta"]);
    let alpha = tmp.path().join("alpha");

    for name in ["one.txt", "two.txt"] {
        let file = alpha.join(name);
        fs::write(&file, b"content").unwrap();
        tx.send(RawEvent::Created {
            path: file,
            is_dir: false,
        })
        .unwrap();
    }
    wait_for_lines(&alpha, 3).await;

    session.shutdown().await.unwrap();
    assert_eq!(source.unregistered.lock().len(), 3);

    // Every log in the tree: header first, then rows whose timestamp and
    // event type parse.
    for entry in walkdir::WalkDir::new(tmp.path())
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        let name = entry.file_name().to_string_lossy();
        if !name.starts_with("log_") || !name.ends_with(".csv") {
            continue;
        }
        let content = fs::read_to_string(entry.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(LOG_HEADER));
        for row in lines {
            let fields: Vec<&str> = row.split(',').collect();
            assert_eq!(fields.len(), 4, "malformed row: {row}");
            assert!(
                chrono::NaiveDateTime::parse_from_str(fields[0], "%Y-%m-%d %H:%M:%S").is_ok(),
                "bad timestamp in row: {row}"
            );
            assert!(["created", "deleted", "modified", "moved"].contains(&fields[1]));
        }
    }
}
