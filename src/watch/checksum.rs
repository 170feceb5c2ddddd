// src/watch/checksum.rs

//! Content digests of the rule directory.
//!
//! [`ChecksumTracker::scan`] answers one question: did the set of rule files,
//! or the bytes of any of them, change since the last successful scan? Rule
//! identity is path-addressed, so a rename of byte-identical content still
//! counts as a change.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use blake3::Hasher;
use tracing::{debug, trace};

use crate::errors::{PolicyWatchError, Result};
use crate::fs::FileSystem;
use crate::watch::matcher::ExtensionMatcher;

/// Fixed-size content digest of a rule file.
pub type Digest = blake3::Hash;

/// Path → digest for every rule file seen by the last successful scan.
pub type RuleFileSnapshot = HashMap<PathBuf, Digest>;

/// Result of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Whether the rule file set differs from the previous snapshot.
    pub changed: bool,
    /// All rule files currently present, sorted.
    pub paths: Vec<PathBuf>,
}

/// Compute the digest of a single file.
pub fn compute_file_digest(fs: &dyn FileSystem, path: &Path) -> AnyResult<Digest> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// List the rule files directly inside `dir`, sorted by path.
///
/// Subdirectories are not descended into.
pub fn list_rule_files(
    fs: &dyn FileSystem,
    dir: &Path,
    matcher: &ExtensionMatcher,
) -> AnyResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|p| matcher.matches(p) && fs.is_file(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Tracks rule-file digests between scans of one directory.
#[derive(Debug)]
pub struct ChecksumTracker {
    root: PathBuf,
    matcher: ExtensionMatcher,
    fs: Arc<dyn FileSystem>,
    snapshot: RuleFileSnapshot,
}

impl ChecksumTracker {
    /// Create a tracker with an empty snapshot; the first successful scan
    /// always reports a change.
    pub fn new(root: impl Into<PathBuf>, matcher: ExtensionMatcher, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            matcher,
            fs,
            snapshot: RuleFileSnapshot::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> &RuleFileSnapshot {
        &self.snapshot
    }

    /// List the current rule files without touching the snapshot.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        list_rule_files(self.fs.as_ref(), &self.root, &self.matcher).map_err(|e| {
            PolicyWatchError::ScanIo {
                path: self.root.clone(),
                reason: format!("{e:#}"),
            }
        })
    }

    /// Re-list and re-hash the directory and replace the snapshot.
    ///
    /// Any error (unreadable directory, no rule files, unreadable file) resets
    /// the snapshot to empty, so the next successful scan is treated as
    /// entirely new.
    pub fn scan(&mut self) -> Result<ScanReport> {
        match self.scan_inner() {
            Ok((report, snapshot)) => {
                self.snapshot = snapshot;
                Ok(report)
            }
            Err(err) => {
                if !self.snapshot.is_empty() {
                    debug!(root = ?self.root, "resetting rule file snapshot after failed scan");
                }
                self.snapshot.clear();
                Err(err)
            }
        }
    }

    fn scan_inner(&self) -> Result<(ScanReport, RuleFileSnapshot)> {
        let paths = self.list()?;
        if paths.is_empty() {
            return Err(PolicyWatchError::EmptyRuleDir {
                path: self.root.clone(),
            });
        }

        let mut next = RuleFileSnapshot::with_capacity(paths.len());
        let mut changed = false;
        for path in &paths {
            let digest = compute_file_digest(self.fs.as_ref(), path).map_err(|e| {
                PolicyWatchError::Digest {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                }
            })?;
            match self.snapshot.get(path) {
                Some(previous) if *previous == digest => {}
                Some(_) => {
                    trace!(?path, "rule file content changed");
                    changed = true;
                }
                None => {
                    trace!(?path, "new rule file");
                    changed = true;
                }
            }
            next.insert(path.clone(), digest);
        }

        if next.len() != self.snapshot.len() {
            changed = true;
        }

        debug!(files = next.len(), changed, "scanned policy directory");
        Ok((ScanReport { changed, paths }, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn tracker(fs: &MockFileSystem) -> ChecksumTracker {
        let matcher = ExtensionMatcher::new(&["yaml", "yml"]).unwrap();
        ChecksumTracker::new("/rules", matcher, Arc::new(fs.clone()))
    }

    #[test]
    fn digest_matches_blake3_of_content() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", b"hello world".to_vec());

        let digest = compute_file_digest(&fs, Path::new("/rules/a.yaml")).unwrap();
        assert_eq!(
            digest.to_hex().as_str(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn first_scan_is_a_change_and_second_is_not() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        fs.add_file("/rules/b.yml", "b");
        fs.add_file("/rules/notes.txt", "ignored");
        let mut t = tracker(&fs);

        let first = t.scan().unwrap();
        assert!(first.changed);
        assert_eq!(
            first.paths,
            vec![PathBuf::from("/rules/a.yaml"), PathBuf::from("/rules/b.yml")]
        );

        let second = t.scan().unwrap();
        assert!(!second.changed);
        assert_eq!(second.paths, first.paths);
    }

    #[test]
    fn content_edit_is_detected() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        fs.add_file("/rules/b.yaml", "b");
        let mut t = tracker(&fs);
        t.scan().unwrap();

        fs.add_file("/rules/b.yaml", "b2");
        let report = t.scan().unwrap();
        assert!(report.changed);
        assert_eq!(report.paths.len(), 2);
    }

    #[test]
    fn rename_of_identical_content_is_a_change() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "same");
        let mut t = tracker(&fs);
        t.scan().unwrap();

        fs.remove("/rules/a.yaml");
        fs.add_file("/rules/renamed.yaml", "same");
        assert!(t.scan().unwrap().changed);
    }

    #[test]
    fn deleting_one_of_several_files_is_a_change() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        fs.add_file("/rules/b.yaml", "b");
        let mut t = tracker(&fs);
        t.scan().unwrap();

        fs.remove("/rules/b.yaml");
        let report = t.scan().unwrap();
        assert!(report.changed);
        assert_eq!(t.snapshot().len(), 1);
    }

    #[test]
    fn empty_directory_resets_snapshot() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        let mut t = tracker(&fs);
        t.scan().unwrap();

        fs.remove("/rules/a.yaml");
        let err = t.scan().unwrap_err();
        assert!(matches!(err, PolicyWatchError::EmptyRuleDir { .. }));
        assert!(t.snapshot().is_empty());

        // Same bytes as before, but the reset makes it novel.
        fs.add_file("/rules/a.yaml", "a");
        assert!(t.scan().unwrap().changed);
    }

    #[test]
    fn missing_directory_is_a_scan_io_error() {
        let fs = MockFileSystem::new();
        let mut t = tracker(&fs);
        let err = t.scan().unwrap_err();
        assert!(matches!(err, PolicyWatchError::ScanIo { .. }));
    }

    #[test]
    fn unreadable_file_is_a_digest_error_and_resets() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        let mut t = tracker(&fs);
        t.scan().unwrap();

        fs.add_unreadable_file("/rules/b.yaml");
        let err = t.scan().unwrap_err();
        assert!(matches!(err, PolicyWatchError::Digest { ref path, .. } if path.ends_with("b.yaml")));
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn subdirectories_are_not_rule_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/rules/a.yaml", "a");
        fs.add_dir("/rules/archive.yaml");
        let t = tracker(&fs);
        assert_eq!(t.list().unwrap(), vec![PathBuf::from("/rules/a.yaml")]);
    }
}
