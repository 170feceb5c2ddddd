// src/engine/core.rs

//! Pure reload decision.
//!
//! Given the outcome of a checksum scan, decide what the monitor loop does
//! next. No channels, no Tokio, no filesystem; the IO shell
//! (`engine::monitor`) carries out the decision.

use std::path::PathBuf;

use crate::errors::{PolicyWatchError, Result};
use crate::watch::ScanReport;

/// What to do after a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadDecision {
    /// Rule files are byte-for-byte what was last seen.
    Unchanged,
    /// Compile this complete path set.
    Compile(Vec<PathBuf>),
    /// The directory holds no rule files; wait for some to be added.
    AwaitPolicies,
    /// The scan failed for another reason; re-list the directory and try to
    /// compile whatever is there.
    Relist,
}

pub fn decide(scan: &Result<ScanReport>) -> ReloadDecision {
    match scan {
        Ok(report) if report.changed => ReloadDecision::Compile(report.paths.clone()),
        Ok(_) => ReloadDecision::Unchanged,
        Err(PolicyWatchError::EmptyRuleDir { .. }) => ReloadDecision::AwaitPolicies,
        Err(_) => ReloadDecision::Relist,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_scan_compiles_the_full_path_set() {
        let scan = Ok(ScanReport {
            changed: true,
            paths: vec![PathBuf::from("/r/a.yaml"), PathBuf::from("/r/b.yaml")],
        });
        assert_eq!(
            decide(&scan),
            ReloadDecision::Compile(vec![PathBuf::from("/r/a.yaml"), PathBuf::from("/r/b.yaml")])
        );
    }

    #[test]
    fn unchanged_scan_does_nothing() {
        let scan = Ok(ScanReport { changed: false, paths: vec![PathBuf::from("/r/a.yaml")] });
        assert_eq!(decide(&scan), ReloadDecision::Unchanged);
    }

    #[test]
    fn empty_directory_waits_and_other_errors_relist() {
        let empty = Err(PolicyWatchError::EmptyRuleDir { path: "/r".into() });
        assert_eq!(decide(&empty), ReloadDecision::AwaitPolicies);

        let digest = Err(PolicyWatchError::Digest { path: "/r/a.yaml".into(), reason: "EACCES".into() });
        assert_eq!(decide(&digest), ReloadDecision::Relist);
    }
}
