#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use policywatch::config::{DrainConfig, MonitorConfig};

/// Builder for `MonitorConfig` with test-friendly drain timing.
///
/// Defaults: `yaml`/`yml` extensions, queue capacity 10, and a drain of
/// 5 empty polls 5ms apart so bursts settle quickly.
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn new(policies_path: impl Into<PathBuf>) -> Self {
        let mut config = MonitorConfig::for_directory(policies_path);
        config.drain = DrainConfig {
            retries: 5,
            interval: Duration::from_millis(5),
            max_burst: None,
        };
        Self { config }
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.config.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn drain(mut self, retries: u32, interval: Duration) -> Self {
        self.config.drain.retries = retries;
        self.config.drain.interval = interval;
        self
    }

    pub fn max_burst(mut self, max_burst: usize) -> Self {
        self.config.drain.max_burst = Some(max_burst);
        self
    }

    pub fn build(self) -> MonitorConfig {
        self.config
    }
}

/// A rule file holding one always-valid rule named `name`.
pub fn rule_yaml(name: &str) -> String {
    format!(
        "- rule: {name}\n  desc: test rule {name}\n  priority: high\n  condition:\n    - field: proc.name\n      op: eq\n      value: {name}\n"
    )
}

/// A rule file that fails to compile (unknown macro reference).
pub fn broken_rule_yaml() -> String {
    "- rule: broken\n  condition:\n    - macro: does_not_exist\n".to_string()
}
