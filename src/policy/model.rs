// src/policy/model.rs

//! On-disk shape of a rule file.
//!
//! A rule file is a YAML sequence. Each item is exactly one of a `rule`, a
//! `list` or a `macro`:
//!
//! ```yaml
//! - list: shells
//!   items: [sh, bash, zsh]
//!
//! - macro: spawned_shell
//!   condition:
//!     - { field: proc.exe, op: in, list: shells }
//!
//! - rule: Shell in container
//!   desc: interactive shell spawned in a container
//!   condition:
//!     - { macro: spawned_shell }
//!     - { field: container.id, op: exists }
//!   priority: high
//!   tags: [mitre:T1059]
//! ```
//!
//! Lists and macros are global: a rule may reference names defined in any
//! other file of the same directory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::value::AttrValue;

/// One item of a rule file.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyItem {
    Rule(RuleDef),
    List(ListDef),
    Macro(MacroDef),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub rule: String,
    #[serde(default)]
    pub desc: Option<String>,
    pub condition: Vec<PredicateDef>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDef {
    pub list: String,
    #[serde(default)]
    pub items: Vec<AttrValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroDef {
    #[serde(rename = "macro")]
    pub name: String,
    pub condition: Vec<PredicateDef>,
}

/// A single condition entry.
///
/// Either a macro reference (`{ macro: name }`) or a field test
/// (`{ field, op, value | list }`). Which combination is legal is checked by
/// the compiler, which reports the offending rule.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicateDef {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub op: Option<Op>,
    #[serde(default)]
    pub value: Option<AttrValue>,
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default, rename = "macro")]
    pub macro_ref: Option<String>,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Ne,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Gt,
    Lt,
    Exists,
    Matches,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Contains => "contains",
            Op::StartsWith => "startswith",
            Op::EndsWith => "endswith",
            Op::In => "in",
            Op::Gt => "gt",
            Op::Lt => "lt",
            Op::Exists => "exists",
            Op::Matches => "matches",
        };
        f.write_str(s)
    }
}

/// Rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// Parse one rule file.
///
/// Items are dispatched on their identifying key so that errors name the item
/// that is wrong instead of "did not match any variant".
pub fn parse_items(content: &str) -> Result<Vec<PolicyItem>, String> {
    let raw: Option<Vec<serde_yaml::Value>> =
        serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    // An empty document is an empty rule file.
    let raw = raw.unwrap_or_default();

    let mut items = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        let item = parse_item(value).map_err(|e| format!("item {index}: {e}"))?;
        items.push(item);
    }
    Ok(items)
}

fn parse_item(value: serde_yaml::Value) -> Result<PolicyItem, String> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| "expected a mapping with a `rule`, `list` or `macro` key".to_string())?;
    let has = |key: &str| mapping.contains_key(key);

    match (has("rule"), has("list"), has("macro")) {
        (true, false, false) => serde_yaml::from_value(value)
            .map(PolicyItem::Rule)
            .map_err(|e| e.to_string()),
        (false, true, false) => serde_yaml::from_value(value)
            .map(PolicyItem::List)
            .map_err(|e| e.to_string()),
        (false, false, true) => serde_yaml::from_value(value)
            .map(PolicyItem::Macro)
            .map_err(|e| e.to_string()),
        (false, false, false) => {
            Err("expected a mapping with a `rule`, `list` or `macro` key".to_string())
        }
        _ => Err("an item may define only one of `rule`, `list` or `macro`".to_string()),
    }
}
