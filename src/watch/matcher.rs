// src/watch/matcher.rs

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::validate::validate_extensions;
use crate::errors::{PolicyWatchError, Result};

/// Recognizes rule files by the extension of their file name.
///
/// The configured extensions are compiled once into a glob set
/// (`["yaml", "yml"]` becomes `*.yaml`, `*.yml`) which is matched against the
/// file name only, never the directory part.
#[derive(Clone)]
pub struct ExtensionMatcher {
    extensions: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for ExtensionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionMatcher")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl ExtensionMatcher {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Result<Self> {
        let extensions: Vec<String> = extensions.iter().map(|e| e.as_ref().to_string()).collect();
        validate_extensions(&extensions)?;

        let mut builder = GlobSetBuilder::new();
        for ext in &extensions {
            let glob = Glob::new(&format!("*.{ext}")).map_err(|e| {
                PolicyWatchError::Config(format!("invalid extension pattern '{ext}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| PolicyWatchError::Config(format!("failed to build extension set: {e}")))?;

        Ok(Self { extensions, set })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns true if the file name of `path` ends in a recognized extension.
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.set.is_match(Path::new(name)),
            None => false,
        }
    }
}
