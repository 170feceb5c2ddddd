// src/engine/gateway.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::errors::Result;
use crate::policy::{RuleCompiler, RuleSet};

/// Runs the rule compiler and stamps successful results with a generation.
///
/// Clones share the generation counter, so every rule set produced through
/// one gateway (initial load and all reloads) is strictly newer than the one
/// before it.
#[derive(Clone)]
pub struct CompileGateway {
    compiler: Arc<dyn RuleCompiler>,
    last_generation: Arc<AtomicU64>,
}

impl fmt::Debug for CompileGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileGateway")
            .field("last_generation", &self.last_generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CompileGateway {
    pub fn new(compiler: Arc<dyn RuleCompiler>) -> Self {
        Self {
            compiler,
            last_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Generation of the most recent successful compile (0 before any).
    pub fn last_generation(&self) -> u64 {
        self.last_generation.load(Ordering::Acquire)
    }

    /// Compile the full set of rule files.
    ///
    /// Failures leave no trace: no generation is consumed and nothing is
    /// returned but the error.
    pub fn compile(&self, paths: &[PathBuf]) -> Result<Arc<RuleSet>> {
        info!(files = paths.len(), "attempting to compile new policy");
        match self.compiler.compile(paths) {
            Ok(rules) => {
                let generation = self.last_generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(
                    generation,
                    rules = rules.len(),
                    enabled = rules.enabled_len(),
                    "compiled policy rule set"
                );
                Ok(Arc::new(rules.with_generation(generation)))
            }
            Err(err) => {
                error!(error = %err, "unable to compile policy files; not using new policy files");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CompileError;
    use crate::types::EngineMode;

    struct Scripted(Vec<bool>, std::sync::Mutex<usize>);

    impl RuleCompiler for Scripted {
        fn compile(&self, _paths: &[PathBuf]) -> std::result::Result<RuleSet, CompileError> {
            let mut i = self.1.lock().unwrap();
            let ok = self.0[*i];
            *i += 1;
            if ok {
                Ok(RuleSet::new(EngineMode::Alert, vec![], vec![]))
            } else {
                Err(CompileError::NoFiles)
            }
        }
    }

    #[test]
    fn failed_compiles_do_not_consume_generations() {
        let gateway = CompileGateway::new(Arc::new(Scripted(
            vec![true, false, true],
            std::sync::Mutex::new(0),
        )));

        assert_eq!(gateway.compile(&[]).unwrap().generation(), 1);
        assert!(gateway.compile(&[]).is_err());
        assert_eq!(gateway.clone().compile(&[]).unwrap().generation(), 2);
        assert_eq!(gateway.last_generation(), 2);
    }
}
