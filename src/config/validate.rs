// src/config/validate.rs

use crate::config::model::{
    ConfigFile, EngineConfig, MonitorConfig, MonitorSection, RawConfigFile,
};
use crate::errors::{PolicyWatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PolicyWatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_monitor_section(&raw.monitor)?;
        Ok(ConfigFile::new_unchecked(
            MonitorConfig::from(&raw.monitor),
            EngineConfig::from(&raw.engine),
        ))
    }
}

fn validate_monitor_section(section: &MonitorSection) -> Result<()> {
    if section.policies_path.as_os_str().is_empty() {
        return Err(PolicyWatchError::Config(
            "[monitor].policies_path must not be empty".to_string(),
        ));
    }
    validate_extensions(&section.extensions)?;

    if section.queue_capacity == 0 {
        return Err(PolicyWatchError::Config(
            "[monitor].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.drain_retries == 0 {
        return Err(PolicyWatchError::Config(
            "[monitor].drain_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Extensions end up inside `*.<ext>` globs, so they must be plain names.
pub fn validate_extensions(extensions: &[String]) -> Result<()> {
    if extensions.is_empty() {
        return Err(PolicyWatchError::Config(
            "[monitor].extensions must list at least one extension".to_string(),
        ));
    }
    for ext in extensions {
        if ext.is_empty() {
            return Err(PolicyWatchError::Config(
                "[monitor].extensions must not contain empty entries".to_string(),
            ));
        }
        if ext.starts_with('.') {
            return Err(PolicyWatchError::Config(format!(
                "extension '{ext}' must be given without a leading dot"
            )));
        }
        if ext.contains(['*', '?', '[', ']', '{', '}', '/', '\\']) {
            return Err(PolicyWatchError::Config(format!(
                "extension '{ext}' contains glob or path characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.monitor.queue_capacity, 10);
        assert_eq!(cfg.monitor.extensions, vec!["yaml", "yml"]);
        assert_eq!(cfg.monitor.drain.retries, 1000);
        assert_eq!(cfg.monitor.drain.max_burst, None);
    }

    #[test]
    fn max_burst_zero_means_uncapped() {
        let cfg = parse("[monitor]\nmax_burst = 25\n").unwrap();
        assert_eq!(cfg.monitor.drain.max_burst, Some(25));
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let err = parse("[monitor]\nqueue_capacity = 0\n").unwrap_err();
        assert!(matches!(err, PolicyWatchError::Config(msg) if msg.contains("queue_capacity")));
    }

    #[test]
    fn rejects_dotted_extension() {
        let err = parse("[monitor]\nextensions = [\".yaml\"]\n").unwrap_err();
        assert!(matches!(err, PolicyWatchError::Config(msg) if msg.contains("leading dot")));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            parse("[monitor]\npolicy_dir = \"x\"\n"),
            Err(PolicyWatchError::Toml(_))
        ));
    }
}
