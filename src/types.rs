use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Monitor`](crate::engine::Monitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Stopped,
    Running,
}

/// Filesystem operation reported by the watch backend.
///
/// `Metadata` covers permission/timestamp changes; it never triggers a
/// reload on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOp {
    Create,
    Remove,
    Write,
    Rename,
    Metadata,
}

impl FileOp {
    /// Operations that can change the content or the set of rule files.
    pub fn alters_rules(self) -> bool {
        matches!(
            self,
            FileOp::Create | FileOp::Remove | FileOp::Write | FileOp::Rename
        )
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileOp::Create => "CREATE",
            FileOp::Remove => "REMOVE",
            FileOp::Write => "WRITE",
            FileOp::Rename => "RENAME",
            FileOp::Metadata => "METADATA",
        };
        f.write_str(s)
    }
}

/// A single change notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: FileOp,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: FileOp) -> Self {
        Self {
            path: path.into(),
            op,
            timestamp: SystemTime::now(),
        }
    }
}

/// What the evaluator emits for a record.
///
/// - `Alert`: only records matching at least one enabled rule are emitted.
/// - `Enrich`: every record is emitted, with the matching rules (possibly none)
///   attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    #[default]
    Alert,
    Enrich,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineMode::Alert => "alert",
            EngineMode::Enrich => "enrich",
        })
    }
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alert" => Ok(EngineMode::Alert),
            "enrich" => Ok(EngineMode::Enrich),
            other => Err(format!(
                "invalid engine mode: {other} (expected \"alert\" or \"enrich\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_changes_do_not_alter_rules() {
        assert!(FileOp::Write.alters_rules());
        assert!(FileOp::Rename.alters_rules());
        assert!(!FileOp::Metadata.alters_rules());
    }

    #[test]
    fn engine_mode_parses_case_insensitively() {
        assert_eq!("Enrich".parse::<EngineMode>(), Ok(EngineMode::Enrich));
        assert_eq!(" alert ".parse::<EngineMode>(), Ok(EngineMode::Alert));
        assert!("drop".parse::<EngineMode>().is_err());
    }
}
