// src/policy/mod.rs

//! Rule language: YAML rule files compiled into an immutable [`RuleSet`].
//!
//! - [`value`] holds the closed set of attribute kinds records and rules use.
//! - [`model`] is the on-disk YAML shape of a rule file.
//! - [`compiler`] turns a complete set of rule files into a [`RuleSet`],
//!   all-or-nothing.
//! - [`ruleset`] evaluates records against a compiled set.

pub mod compiler;
pub mod model;
pub mod ruleset;
pub mod value;

pub use compiler::{CompileError, RuleCompiler, YamlRuleCompiler};
pub use model::{Op, Priority};
pub use ruleset::{CompiledPredicate, CompiledRule, Record, RuleMatch, RuleSet};
pub use value::AttrValue;
