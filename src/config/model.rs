// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::EngineMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [monitor]
/// policies_path = "/etc/policywatch/policies"
/// extensions = ["yaml", "yml"]
/// queue_capacity = 10
/// drain_retries = 1000
/// drain_interval_ms = 10
/// max_burst = 0
///
/// [engine]
/// mode = "alert"
/// ```
///
/// Both sections are optional and every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub engine: EngineSection,
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    /// Directory holding the rule files. Not searched recursively.
    #[serde(default = "default_policies_path")]
    pub policies_path: PathBuf,

    /// File extensions (without the dot) that mark a file as a rule file.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Capacity of the handoff queue between monitor and consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How many times the coalescer finds the notification queue empty
    /// before it gives up draining a burst.
    #[serde(default = "default_drain_retries")]
    pub drain_retries: u32,

    /// Pause between two empty polls while draining, in milliseconds.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Stop draining after this many qualifying events. `0` disables the cap.
    #[serde(default)]
    pub max_burst: usize,
}

fn default_policies_path() -> PathBuf {
    PathBuf::from("policies")
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

fn default_queue_capacity() -> usize {
    10
}

fn default_drain_retries() -> u32 {
    1000
}

fn default_drain_interval_ms() -> u64 {
    10
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            policies_path: default_policies_path(),
            extensions: default_extensions(),
            queue_capacity: default_queue_capacity(),
            drain_retries: default_drain_retries(),
            drain_interval_ms: default_drain_interval_ms(),
            max_burst: 0,
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default)]
    pub mode: EngineMode,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (or `Default`), so
/// holders can rely on the invariants checked in `validate.rs`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub monitor: MonitorConfig,
    pub engine: EngineConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(monitor: MonitorConfig, engine: EngineConfig) -> Self {
        Self { monitor, engine }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        Self::new_unchecked(MonitorConfig::from(&raw.monitor), EngineConfig::from(&raw.engine))
    }
}

/// Burst-draining parameters of the event coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    pub retries: u32,
    pub interval: Duration,
    pub max_burst: Option<usize>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            retries: default_drain_retries(),
            interval: Duration::from_millis(default_drain_interval_ms()),
            max_burst: None,
        }
    }
}

/// Everything the policy monitor needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub policies_path: PathBuf,
    pub extensions: Vec<String>,
    pub queue_capacity: usize,
    pub drain: DrainConfig,
}

impl MonitorConfig {
    /// Defaults for everything except the watched directory.
    pub fn for_directory(policies_path: impl Into<PathBuf>) -> Self {
        Self {
            policies_path: policies_path.into(),
            extensions: default_extensions(),
            queue_capacity: default_queue_capacity(),
            drain: DrainConfig::default(),
        }
    }
}

impl From<&MonitorSection> for MonitorConfig {
    fn from(section: &MonitorSection) -> Self {
        Self {
            policies_path: section.policies_path.clone(),
            extensions: section.extensions.clone(),
            queue_capacity: section.queue_capacity,
            drain: DrainConfig {
                retries: section.drain_retries,
                interval: Duration::from_millis(section.drain_interval_ms),
                max_burst: (section.max_burst > 0).then_some(section.max_burst),
            },
        }
    }
}

/// The value a rule compiler is constructed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: EngineMode,
}

impl From<&EngineSection> for EngineConfig {
    fn from(section: &EngineSection) -> Self {
        Self { mode: section.mode }
    }
}
