//! Error types and Result aliases for fsaudit.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Per-event failures (a file vanishing before it could be inspected, a
//! single log append failing) are deliberately *not* represented here: those
//! are contained where they happen and surfaced as diagnostics only. Errors
//! in this module are the ones that cross component boundaries.

use thiserror::Error;

/// Result type alias using fsaudit's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fsaudit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Watch registration error.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Log archival error.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Watch source and registry errors.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The monitored root cannot be watched. Fatal at startup.
    #[error("watched root '{path}' is unavailable: {reason}")]
    RootUnavailable { path: String, reason: String },

    /// Failed to register a path with the watch source.
    #[error("failed to register watch for '{path}': {reason}")]
    RegisterFailed { path: String, reason: String },

    /// Failed to unregister a path from the watch source.
    #[error("failed to unregister watch for '{path}': {reason}")]
    UnregisterFailed { path: String, reason: String },

    /// The underlying notification backend failed.
    #[error("watch backend error: {0}")]
    Backend(String),
}

/// Daily archival errors.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Backup directory could not be created.
    #[error("failed to create backup directory '{dir}': {reason}")]
    BackupDir { dir: String, reason: String },

    /// Copying a log into its dated backup failed.
    #[error("failed to back up log '{log}': {reason}")]
    CopyFailed { log: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatchError {
    /// Create a registration failure for a path.
    pub fn register(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RegisterFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an unregistration failure for a path.
    pub fn unregister(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UnregisterFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
