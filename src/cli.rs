// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `policywatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "policywatch",
    version,
    about = "Evaluate JSON records against a hot-reloaded directory of YAML policy rules.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `policywatch.toml` in the current working directory. A
    /// missing default file means built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = "policywatch.toml")]
    pub config: String,

    /// Policy directory to watch. Overrides `monitor.policies_path`.
    #[arg(long, value_name = "DIR")]
    pub policies: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `POLICYWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Compile the policy directory once, print a summary, and exit.
    #[arg(long)]
    pub check: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
