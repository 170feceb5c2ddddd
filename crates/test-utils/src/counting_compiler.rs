use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use policywatch::config::EngineConfig;
use policywatch::fs::FileSystem;
use policywatch::policy::{CompileError, RuleCompiler, RuleSet, YamlRuleCompiler};

/// Wraps the YAML compiler and records every path set it was asked to
/// compile.
pub struct CountingCompiler {
    inner: YamlRuleCompiler,
    calls: Mutex<Vec<Vec<PathBuf>>>,
    delay: Option<Duration>,
}

impl CountingCompiler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Arc<Self> {
        Arc::new(Self::build(fs, None))
    }

    /// Like [`CountingCompiler::new`], but every compile blocks for `delay`
    /// first.
    pub fn slow(fs: Arc<dyn FileSystem>, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(fs, Some(delay)))
    }

    fn build(fs: Arc<dyn FileSystem>, delay: Option<Duration>) -> Self {
        Self {
            inner: YamlRuleCompiler::with_filesystem(EngineConfig::default(), fs),
            calls: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<Vec<PathBuf>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl RuleCompiler for CountingCompiler {
    fn compile(&self, paths: &[PathBuf]) -> Result<RuleSet, CompileError> {
        self.calls.lock().unwrap().push(paths.to_vec());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.compile(paths)
    }
}
