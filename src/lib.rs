// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::engine::{spawn_swap_consumer, CompileGateway, EvaluatorSlot, Monitor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::policy::{RuleSet, YamlRuleCompiler};
use crate::watch::{ExtensionMatcher, NotifyBackend};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the initial compile of the policy directory
/// - the policy monitor and the consumer-side swap
/// - record evaluation on stdin/stdout
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_config(Path::new(&args.config))?;
    if let Some(policies) = &args.policies {
        cfg.monitor.policies_path = PathBuf::from(policies);
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let compiler = YamlRuleCompiler::with_filesystem(cfg.engine, Arc::clone(&fs));
    let gateway = CompileGateway::new(Arc::new(compiler));

    let matcher = ExtensionMatcher::new(&cfg.monitor.extensions)?;
    let initial_paths = watch::list_rule_files(fs.as_ref(), &cfg.monitor.policies_path, &matcher)
        .unwrap_or_else(|err| {
            warn!(path = ?cfg.monitor.policies_path, error = %err, "unable to list policy directory");
            Vec::new()
        });

    if args.check {
        let rules = gateway.compile(&initial_paths)?;
        print_check(&cfg, &rules);
        return Ok(());
    }

    let slot = Arc::new(EvaluatorSlot::new());
    if initial_paths.is_empty() {
        warn!(path = ?cfg.monitor.policies_path, "no policy files yet; records are dropped until some are added");
    } else if let Ok(rules) = gateway.compile(&initial_paths) {
        info!(generation = rules.generation(), rules = rules.len(), "loaded initial policy rule set");
        slot.adopt(rules);
    }

    let (mut monitor, rx) = Monitor::new(cfg.monitor.clone(), gateway, Arc::new(NotifyBackend), fs)?;
    let consumer = spawn_swap_consumer(rx, Arc::clone(&slot));
    monitor.start()?;

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("shutdown requested");
        }
        processed = pipeline::process_stream(stdin, stdout, Arc::clone(&slot)) => {
            match processed {
                Ok(emitted) => info!(emitted, "input closed"),
                Err(e) => error!(error = %e, "record stream failed"),
            }
        }
    }

    monitor.stop();
    monitor.wait().await;
    // Dropping the monitor drops the last publisher handle, which lets the
    // swap consumer finish.
    drop(monitor);
    if let Err(e) = consumer.await {
        warn!(error = %e, "swap consumer ended abnormally");
    }
    Ok(())
}

/// Load the config file, falling back to defaults when the default path is
/// simply absent.
fn load_config(path: &Path) -> Result<ConfigFile> {
    if path == default_config_path() && !path.exists() {
        info!(path = ?path, "no config file found; using defaults");
        return Ok(ConfigFile::default());
    }
    Ok(load_and_validate(path)?)
}

fn print_check(cfg: &ConfigFile, rules: &RuleSet) {
    println!("policywatch check");
    println!("  monitor.policies_path = {}", cfg.monitor.policies_path.display());
    println!("  monitor.extensions = {:?}", cfg.monitor.extensions);
    println!("  engine.mode = {}", rules.mode());
    println!();

    println!("sources ({}):", rules.sources().len());
    for source in rules.sources() {
        println!("  - {}", source.display());
    }
    println!();

    println!("rules ({}, {} enabled):", rules.len(), rules.enabled_len());
    for rule in rules.rules() {
        let state = if rule.enabled { "" } else { " (disabled)" };
        println!("  - {} [{}]{state}", rule.name, rule.priority);
        if let Some(desc) = &rule.desc {
            println!("      desc: {desc}");
        }
        if !rule.tags.is_empty() {
            println!("      tags: {:?}", rule.tags);
        }
    }
}
