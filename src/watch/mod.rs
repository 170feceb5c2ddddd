// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Deciding which file names count as rule files (`matcher`).
//! - Wiring up a cross-platform filesystem watcher (`notify`) behind the
//!   [`WatchBackend`] seam (`backend`).
//! - Absorbing bursts of notifications into one trigger (`coalesce`).
//! - Content digests of the rule directory, so reloads only happen when rule
//!   files actually changed (`checksum`).
//!
//! It does **not** compile or publish anything; that lives in [`crate::engine`].

pub mod backend;
pub mod checksum;
pub mod coalesce;
pub mod matcher;

pub use backend::{NotifyBackend, WatchBackend, WatchMessage, WatchSubscription};
pub use checksum::{
    compute_file_digest, list_rule_files, ChecksumTracker, Digest, RuleFileSnapshot, ScanReport,
};
pub use coalesce::{DrainOutcome, EventCoalescer};
pub use matcher::ExtensionMatcher;
