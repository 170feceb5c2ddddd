// src/policy/ruleset.rs

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::model::Priority;
use crate::policy::value::AttrValue;
use crate::types::EngineMode;

/// A flat telemetry record: attribute name → value.
///
/// Names are dotted paths such as `proc.exe` or `container.id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, AttrValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<AttrValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&AttrValue> {
        self.fields.get(field)
    }
}

/// A field test with its operand resolved to a concrete kind.
///
/// Built once by the compiler. Evaluation is a plain match, with no operand
/// type inspection at run time.
#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    StrEq { field: String, value: String, negate: bool },
    IntEq { field: String, value: i64, negate: bool },
    BoolEq { field: String, value: bool, negate: bool },
    Contains { field: String, needle: String },
    StartsWith { field: String, prefix: String },
    EndsWith { field: String, suffix: String },
    InStr { field: String, set: HashSet<String> },
    InInt { field: String, set: HashSet<i64> },
    Gt { field: String, bound: i64 },
    Lt { field: String, bound: i64 },
    Exists { field: String },
    Matches { field: String, regex: Regex },
}

impl CompiledPredicate {
    pub fn field(&self) -> &str {
        match self {
            CompiledPredicate::StrEq { field, .. }
            | CompiledPredicate::IntEq { field, .. }
            | CompiledPredicate::BoolEq { field, .. }
            | CompiledPredicate::Contains { field, .. }
            | CompiledPredicate::StartsWith { field, .. }
            | CompiledPredicate::EndsWith { field, .. }
            | CompiledPredicate::InStr { field, .. }
            | CompiledPredicate::InInt { field, .. }
            | CompiledPredicate::Gt { field, .. }
            | CompiledPredicate::Lt { field, .. }
            | CompiledPredicate::Exists { field }
            | CompiledPredicate::Matches { field, .. } => field,
        }
    }

    /// A missing field or a value of another kind never matches, except for
    /// `Exists`, which only checks presence.
    pub fn eval(&self, record: &Record) -> bool {
        let Some(actual) = record.get(self.field()) else {
            return false;
        };

        match self {
            CompiledPredicate::StrEq { value, negate, .. } => {
                actual.as_str().is_some_and(|s| (s == value) != *negate)
            }
            CompiledPredicate::IntEq { value, negate, .. } => {
                actual.as_int().is_some_and(|i| (i == *value) != *negate)
            }
            CompiledPredicate::BoolEq { value, negate, .. } => {
                matches!(actual, AttrValue::Bool(b) if (b == value) != *negate)
            }
            CompiledPredicate::Contains { needle, .. } => match actual {
                AttrValue::Str(s) => s.contains(needle.as_str()),
                AttrValue::List(items) => items.iter().any(|i| i.as_str() == Some(needle.as_str())),
                _ => false,
            },
            CompiledPredicate::StartsWith { prefix, .. } => {
                actual.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            CompiledPredicate::EndsWith { suffix, .. } => {
                actual.as_str().is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            CompiledPredicate::InStr { set, .. } => actual.as_str().is_some_and(|s| set.contains(s)),
            CompiledPredicate::InInt { set, .. } => actual.as_int().is_some_and(|i| set.contains(&i)),
            CompiledPredicate::Gt { bound, .. } => actual.as_int().is_some_and(|i| i > *bound),
            CompiledPredicate::Lt { bound, .. } => actual.as_int().is_some_and(|i| i < *bound),
            CompiledPredicate::Exists { .. } => true,
            CompiledPredicate::Matches { regex, .. } => {
                actual.as_str().is_some_and(|s| regex.is_match(s))
            }
        }
    }
}

/// A rule with macros expanded and operands resolved.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub desc: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub enabled: bool,
    /// All predicates must hold. Never empty.
    pub condition: Vec<CompiledPredicate>,
}

impl CompiledRule {
    pub fn matches(&self, record: &Record) -> bool {
        self.enabled && self.condition.iter().all(|p| p.eval(record))
    }
}

/// A rule that fired for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    pub rule: String,
    pub priority: Priority,
    pub tags: Vec<String>,
}

/// The immutable result of compiling every rule file of a directory together.
///
/// Shared behind an `Arc` once published; nothing mutates it afterwards.
#[derive(Debug)]
pub struct RuleSet {
    generation: u64,
    mode: EngineMode,
    rules: Vec<CompiledRule>,
    sources: Vec<PathBuf>,
}

impl RuleSet {
    /// A rule set with generation `0`; the compile gateway stamps the real
    /// generation before publishing.
    pub fn new(mode: EngineMode, rules: Vec<CompiledRule>, sources: Vec<PathBuf>) -> Self {
        Self {
            generation: 0,
            mode,
            rules,
            sources,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Rule files this set was compiled from.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_len(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    /// All enabled rules matching `record`, in definition order.
    pub fn evaluate(&self, record: &Record) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(record))
            .map(|rule| RuleMatch {
                rule: rule.name.clone(),
                priority: rule.priority,
                tags: rule.tags.clone(),
            })
            .collect()
    }

    /// Whether a record with these matches is emitted in this set's mode.
    pub fn should_emit(&self, matches: &[RuleMatch]) -> bool {
        match self.mode {
            EngineMode::Alert => !matches.is_empty(),
            EngineMode::Enrich => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, condition: Vec<CompiledPredicate>) -> CompiledRule {
        CompiledRule {
            name: name.to_string(),
            desc: None,
            priority: Priority::Medium,
            tags: vec![],
            enabled: true,
            condition,
        }
    }

    #[test]
    fn predicates_require_matching_kinds() {
        let record = Record::new().with("proc.pid", 42).with("proc.exe", "/bin/sh");

        let int_eq = CompiledPredicate::IntEq { field: "proc.pid".into(), value: 42, negate: false };
        let str_on_int = CompiledPredicate::StrEq { field: "proc.pid".into(), value: "42".into(), negate: false };
        let ne_missing = CompiledPredicate::StrEq { field: "user.name".into(), value: "root".into(), negate: true };

        assert!(int_eq.eval(&record));
        assert!(!str_on_int.eval(&record));
        assert!(!ne_missing.eval(&record));
    }

    #[test]
    fn contains_works_on_strings_and_lists() {
        let record = Record::new()
            .with("proc.cmdline", "bash -c id")
            .with("proc.args", AttrValue::List(vec!["-c".into(), "id".into()]));

        let on_str = CompiledPredicate::Contains { field: "proc.cmdline".into(), needle: "-c".into() };
        let on_list = CompiledPredicate::Contains { field: "proc.args".into(), needle: "id".into() };
        assert!(on_str.eval(&record));
        assert!(on_list.eval(&record));
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut r = rule("r", vec![CompiledPredicate::Exists { field: "a".into() }]);
        let record = Record::new().with("a", true);
        assert!(r.matches(&record));
        r.enabled = false;
        assert!(!r.matches(&record));
    }

    #[test]
    fn alert_mode_emits_only_matches() {
        let set = RuleSet::new(
            EngineMode::Alert,
            vec![rule("needs-a", vec![CompiledPredicate::Exists { field: "a".into() }])],
            vec![],
        );
        let hit = set.evaluate(&Record::new().with("a", 1));
        let miss = set.evaluate(&Record::new().with("b", 1));
        assert!(set.should_emit(&hit));
        assert!(!set.should_emit(&miss));

        let enrich = RuleSet::new(EngineMode::Enrich, vec![], vec![]);
        assert!(enrich.should_emit(&[]));
    }

    #[test]
    fn records_deserialize_from_flat_json() {
        let record: Record =
            serde_json::from_str(r#"{"proc.exe":"/bin/sh","proc.pid":7,"proc.tty":true}"#).unwrap();
        assert_eq!(record.get("proc.pid"), Some(&AttrValue::Int(7)));
        assert_eq!(record.get("proc.tty"), Some(&AttrValue::Bool(true)));
    }
}
