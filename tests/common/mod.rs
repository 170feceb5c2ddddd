#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use policywatch::config::MonitorConfig;
use policywatch::engine::{CompileGateway, Monitor, RuleSetReceiver};
use policywatch::fs::mock::MockFileSystem;
use policywatch::fs::FileSystem;

pub use policywatch_test_utils::builders::{broken_rule_yaml, rule_yaml, MonitorConfigBuilder};
pub use policywatch_test_utils::{
    eventually, init_tracing, settle, with_timeout, CountingCompiler, FakeWatchBackend,
};

/// Directory the mock-filesystem tests keep their rule files in.
pub const POLICIES: &str = "/policies";

pub fn policy_path(name: &str) -> PathBuf {
    Path::new(POLICIES).join(name)
}

/// A monitor wired to an in-memory filesystem and a test-driven watcher.
pub struct Harness {
    pub fs: MockFileSystem,
    pub backend: Arc<FakeWatchBackend>,
    pub compiler: Arc<CountingCompiler>,
    pub gateway: CompileGateway,
    pub monitor: Monitor,
    pub rx: RuleSetReceiver,
}

impl Harness {
    pub fn new(fs: MockFileSystem) -> Self {
        Self::with_config(fs, MonitorConfigBuilder::new(POLICIES).build())
    }

    pub fn with_config(fs: MockFileSystem, config: MonitorConfig) -> Self {
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let compiler = CountingCompiler::new(Arc::clone(&shared));
        Self::assemble(fs, config, compiler)
    }

    pub fn assemble(fs: MockFileSystem, config: MonitorConfig, compiler: Arc<CountingCompiler>) -> Self {
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let backend = FakeWatchBackend::new();
        let gateway = CompileGateway::new(compiler.clone());
        let (monitor, rx) = Monitor::new(config, gateway.clone(), backend.clone(), shared)
            .expect("monitor should build");
        Self { fs, backend, compiler, gateway, monitor, rx }
    }

    /// Notify a write to `name` inside the policy directory.
    pub fn touch(&self, name: &str) {
        assert!(self.backend.send_change(policy_path(name), policywatch::types::FileOp::Write));
    }

    pub async fn expect_generation(&mut self, generation: u64) {
        let rules = with_timeout(self.rx.recv()).await.expect("publisher closed");
        assert_eq!(rules.generation(), generation);
    }

    pub async fn expect_nothing_published(&mut self) {
        settle().await;
        assert!(self.rx.try_recv().is_err(), "unexpected rule set published");
    }
}

/// A mock filesystem holding `files` (name, content) under [`POLICIES`].
pub fn policies_fs(files: &[(&str, String)]) -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_dir(POLICIES);
    for (name, content) in files {
        fs.add_file(policy_path(name), content.clone());
    }
    fs
}
