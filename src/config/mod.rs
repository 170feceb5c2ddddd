// src/config/mod.rs

//! Configuration loading and validation for policywatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate monitor tuning and engine settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DrainConfig, EngineConfig, EngineSection, MonitorConfig, MonitorSection,
    RawConfigFile,
};
