// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::policy::CompileError;

#[derive(Error, Debug)]
pub enum PolicyWatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The policy directory could not be subscribed to at start-up.
    #[error("unable to watch policy directory {path:?}: {reason}")]
    WatchSubscription { path: PathBuf, reason: String },

    /// The policy directory could not be listed.
    #[error("unable to list policy directory {path:?}: {reason}")]
    ScanIo { path: PathBuf, reason: String },

    /// The policy directory holds no recognized rule files.
    #[error("no policy files with a recognized extension found in policy directory {path:?}")]
    EmptyRuleDir { path: PathBuf },

    /// A rule file could not be read or hashed during a scan.
    #[error("unable to calculate digest for policy file {path:?}: {reason}")]
    Digest { path: PathBuf, reason: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The handoff queue was full; the new rule set was dropped.
    #[error("rule set generation {generation} dropped: handoff queue full (capacity {capacity})")]
    PublishBackpressure { generation: u64, capacity: usize },

    /// Nobody is receiving published rule sets anymore.
    #[error("rule set generation {generation} dropped: handoff queue closed")]
    PublisherClosed { generation: u64 },

    #[error("file watch error: {0}")]
    WatchStream(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PolicyWatchError>;
