// src/engine/mod.rs

//! Hot-reload engine.
//!
//! This module ties together:
//! - the compile gateway (rule files → stamped, immutable [`RuleSet`])
//! - the publisher (bounded, non-blocking handoff to the consumer)
//! - the monitor controller that reacts to:
//!   - file-watch notifications
//!   - watch stream errors
//!   - stop requests
//! - the consumer-side swap point ([`EvaluatorSlot`])
//!
//! The reload decision itself is a pure function in [`core`]; the async/IO
//! shell is implemented in [`monitor`].
//!
//! [`RuleSet`]: crate::policy::RuleSet

pub mod core;
pub mod gateway;
pub mod monitor;
pub mod publisher;
pub mod swap;

pub use self::core::{decide, ReloadDecision};
pub use gateway::CompileGateway;
pub use monitor::Monitor;
pub use publisher::{Publisher, RuleSetReceiver};
pub use swap::{spawn_swap_consumer, EvaluatorSlot};
