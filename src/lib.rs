//! fsaudit library
//!
//! Directory tree change auditor: append-only CSV change logs per watched
//! subtree, fingerprint-based suppression of repeated modifications, and
//! daily log archival.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod error;
pub mod observability;
pub mod session;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
