// src/policy/compiler.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::fs::{FileSystem, RealFileSystem};
use crate::policy::model::{parse_items, ListDef, MacroDef, Op, PolicyItem, PredicateDef, RuleDef};
use crate::policy::ruleset::{CompiledPredicate, CompiledRule, RuleSet};
use crate::policy::value::AttrValue;

/// Why a candidate rule file set was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("no policy files to compile")]
    NoFiles,

    #[error("unable to read policy file {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("unable to parse policy file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid policy in {path:?}: {reason}")]
    Validation { path: PathBuf, reason: String },
}

/// Compiles the complete set of rule files into one [`RuleSet`].
///
/// Implementations must be all-or-nothing: any error in any file rejects the
/// whole set. Compiling never touches a previously returned set.
pub trait RuleCompiler: Send + Sync {
    fn compile(&self, paths: &[PathBuf]) -> Result<RuleSet, CompileError>;
}

/// Compiler for the YAML rule language described in [`crate::policy::model`].
#[derive(Debug, Clone)]
pub struct YamlRuleCompiler {
    config: EngineConfig,
    fs: Arc<dyn FileSystem>,
}

impl YamlRuleCompiler {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_filesystem(config, Arc::new(RealFileSystem))
    }

    pub fn with_filesystem(config: EngineConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    /// A fresh, empty builder. Every compile starts from one.
    pub fn builder(&self) -> RuleSetBuilder {
        RuleSetBuilder::new(self.config)
    }
}

impl RuleCompiler for YamlRuleCompiler {
    fn compile(&self, paths: &[PathBuf]) -> Result<RuleSet, CompileError> {
        if paths.is_empty() {
            return Err(CompileError::NoFiles);
        }

        let mut builder = self.builder();
        for path in paths {
            let content = self.fs.read_to_string(path).map_err(|e| CompileError::Read {
                path: path.clone(),
                reason: format!("{e:#}"),
            })?;
            builder.add_source(path, &content)?;
        }
        builder.build()
    }
}

/// Collects the items of every rule file, then resolves them together.
#[derive(Debug)]
pub struct RuleSetBuilder {
    config: EngineConfig,
    sources: Vec<PathBuf>,
    rules: Vec<(PathBuf, RuleDef)>,
    rule_names: HashMap<String, PathBuf>,
    lists: HashMap<String, (PathBuf, Vec<AttrValue>)>,
    macros: HashMap<String, (PathBuf, Vec<PredicateDef>)>,
}

impl RuleSetBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            rules: Vec::new(),
            rule_names: HashMap::new(),
            lists: HashMap::new(),
            macros: HashMap::new(),
        }
    }

    /// Parse one rule file and register its items.
    pub fn add_source(&mut self, path: &Path, content: &str) -> Result<(), CompileError> {
        let items = parse_items(content).map_err(|reason| CompileError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        for item in items {
            match item {
                PolicyItem::Rule(rule) => self.add_rule(path, rule)?,
                PolicyItem::List(list) => self.add_list(path, list)?,
                PolicyItem::Macro(mac) => self.add_macro(path, mac)?,
            }
        }
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    fn add_rule(&mut self, path: &Path, rule: RuleDef) -> Result<(), CompileError> {
        if let Some(first) = self.rule_names.get(&rule.rule) {
            return Err(invalid(
                path,
                format!("duplicate rule '{}' (first defined in {:?})", rule.rule, first),
            ));
        }
        self.rule_names.insert(rule.rule.clone(), path.to_path_buf());
        self.rules.push((path.to_path_buf(), rule));
        Ok(())
    }

    fn add_list(&mut self, path: &Path, list: ListDef) -> Result<(), CompileError> {
        if let Some((first, _)) = self.lists.get(&list.list) {
            return Err(invalid(
                path,
                format!("duplicate list '{}' (first defined in {:?})", list.list, first),
            ));
        }
        self.lists.insert(list.list, (path.to_path_buf(), list.items));
        Ok(())
    }

    fn add_macro(&mut self, path: &Path, mac: MacroDef) -> Result<(), CompileError> {
        if let Some((first, _)) = self.macros.get(&mac.name) {
            return Err(invalid(
                path,
                format!("duplicate macro '{}' (first defined in {:?})", mac.name, first),
            ));
        }
        self.macros.insert(mac.name, (path.to_path_buf(), mac.condition));
        Ok(())
    }

    /// Resolve every reference and produce the rule set.
    pub fn build(self) -> Result<RuleSet, CompileError> {
        self.check_macros()?;

        // Unused macros are still type-checked; a broken body rejects the set.
        let mut scratch = Vec::new();
        for (name, (path, body)) in &self.macros {
            scratch.clear();
            self.resolve_condition(body, &mut scratch)
                .map_err(|reason| invalid(path, format!("macro '{name}': {reason}")))?;
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        for (path, def) in &self.rules {
            if def.condition.is_empty() {
                return Err(invalid(path, format!("rule '{}' has an empty condition", def.rule)));
            }
            let mut condition = Vec::new();
            self.resolve_condition(&def.condition, &mut condition)
                .map_err(|reason| invalid(path, format!("rule '{}': {reason}", def.rule)))?;

            rules.push(CompiledRule {
                name: def.rule.clone(),
                desc: def.desc.clone(),
                priority: def.priority,
                tags: def.tags.clone(),
                enabled: def.enabled,
                condition,
            });
        }

        debug!(
            rules = rules.len(),
            lists = self.lists.len(),
            macros = self.macros.len(),
            files = self.sources.len(),
            "compiled policy files"
        );
        Ok(RuleSet::new(self.config.mode, rules, self.sources))
    }

    /// Macros must be non-empty, reference only known macros, and not form a
    /// reference cycle.
    fn check_macros(&self) -> Result<(), CompileError> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.macros.keys() {
            graph.add_node(name.as_str());
        }

        for (name, (path, condition)) in &self.macros {
            if condition.is_empty() {
                return Err(invalid(path, format!("macro '{name}' has an empty condition")));
            }
            for pred in condition {
                if let Some(target) = pred.macro_ref.as_deref() {
                    if !self.macros.contains_key(target) {
                        return Err(invalid(
                            path,
                            format!("macro '{name}' references unknown macro '{target}'"),
                        ));
                    }
                    graph.add_edge(name.as_str(), target, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => {
                let node = cycle.node_id();
                let path = self
                    .macros
                    .get(node)
                    .map(|(p, _)| p.clone())
                    .unwrap_or_default();
                Err(invalid(
                    &path,
                    format!("macro reference cycle involving macro '{node}'"),
                ))
            }
        }
    }

    /// Expand macros in place and compile each field test.
    ///
    /// Terminates because `check_macros` ruled out cycles.
    fn resolve_condition(
        &self,
        condition: &[PredicateDef],
        out: &mut Vec<CompiledPredicate>,
    ) -> Result<(), String> {
        for pred in condition {
            match pred.macro_ref.as_deref() {
                Some(name) => {
                    if pred.field.is_some() || pred.op.is_some() || pred.value.is_some() || pred.list.is_some() {
                        return Err(format!(
                            "macro reference '{name}' must not carry field, op, value or list"
                        ));
                    }
                    let (_, body) = self
                        .macros
                        .get(name)
                        .ok_or_else(|| format!("unknown macro '{name}'"))?;
                    self.resolve_condition(body, out)?;
                }
                None => out.push(self.compile_predicate(pred)?),
            }
        }
        Ok(())
    }

    fn compile_predicate(&self, pred: &PredicateDef) -> Result<CompiledPredicate, String> {
        let field = pred
            .field
            .clone()
            .ok_or_else(|| "condition entry needs either `macro` or `field`".to_string())?;
        let op = pred
            .op
            .ok_or_else(|| format!("condition on '{field}' has no `op`"))?;

        if pred.list.is_some() && op != Op::In {
            return Err(format!("`list` is only valid with op `in` (field '{field}', op `{op}`)"));
        }

        match op {
            Op::Exists => {
                if pred.value.is_some() {
                    return Err(format!("op `exists` on '{field}' takes no value"));
                }
                Ok(CompiledPredicate::Exists { field })
            }
            Op::In => self.compile_membership(field, pred),
            Op::Eq | Op::Ne => {
                let negate = op == Op::Ne;
                match required_value(&field, op, pred)? {
                    AttrValue::Str(value) => Ok(CompiledPredicate::StrEq { field, value: value.clone(), negate }),
                    AttrValue::Int(value) => Ok(CompiledPredicate::IntEq { field, value: *value, negate }),
                    AttrValue::Bool(value) => Ok(CompiledPredicate::BoolEq { field, value: *value, negate }),
                    AttrValue::List(_) => Err(format!(
                        "op `{op}` on '{field}' cannot compare against a list; use `in`"
                    )),
                }
            }
            Op::Contains => {
                let needle = string_value(&field, op, pred)?;
                Ok(CompiledPredicate::Contains { field, needle })
            }
            Op::StartsWith => {
                let prefix = string_value(&field, op, pred)?;
                Ok(CompiledPredicate::StartsWith { field, prefix })
            }
            Op::EndsWith => {
                let suffix = string_value(&field, op, pred)?;
                Ok(CompiledPredicate::EndsWith { field, suffix })
            }
            Op::Gt => {
                let bound = int_value(&field, op, pred)?;
                Ok(CompiledPredicate::Gt { field, bound })
            }
            Op::Lt => {
                let bound = int_value(&field, op, pred)?;
                Ok(CompiledPredicate::Lt { field, bound })
            }
            Op::Matches => {
                let pattern = string_value(&field, op, pred)?;
                let regex = Regex::new(&pattern)
                    .map_err(|e| format!("invalid regex for '{field}': {e}"))?;
                Ok(CompiledPredicate::Matches { field, regex })
            }
        }
    }

    fn compile_membership(&self, field: String, pred: &PredicateDef) -> Result<CompiledPredicate, String> {
        let items: &[AttrValue] = match (&pred.list, &pred.value) {
            (Some(name), None) => {
                let (_, items) = self
                    .lists
                    .get(name)
                    .ok_or_else(|| format!("unknown list '{name}'"))?;
                items.as_slice()
            }
            (None, Some(AttrValue::List(items))) => items.as_slice(),
            (None, Some(other)) => {
                return Err(format!(
                    "op `in` on '{field}' needs a list value, got {}",
                    other.kind()
                ));
            }
            (None, None) => return Err(format!("op `in` on '{field}' needs `list` or `value`")),
            (Some(_), Some(_)) => {
                return Err(format!("op `in` on '{field}' takes either `list` or `value`, not both"));
            }
        };

        if items.iter().all(|i| matches!(i, AttrValue::Int(_))) && !items.is_empty() {
            let set: HashSet<i64> = items.iter().filter_map(AttrValue::as_int).collect();
            return Ok(CompiledPredicate::InInt { field, set });
        }
        if items.iter().all(|i| matches!(i, AttrValue::Str(_))) {
            let set: HashSet<String> = items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect();
            return Ok(CompiledPredicate::InStr { field, set });
        }
        Err(format!(
            "op `in` on '{field}' needs items that are all strings or all integers"
        ))
    }
}

fn invalid(path: &Path, reason: String) -> CompileError {
    CompileError::Validation {
        path: path.to_path_buf(),
        reason,
    }
}

fn required_value<'a>(field: &str, op: Op, pred: &'a PredicateDef) -> Result<&'a AttrValue, String> {
    pred.value
        .as_ref()
        .ok_or_else(|| format!("op `{op}` on '{field}' needs a `value`"))
}

fn string_value(field: &str, op: Op, pred: &PredicateDef) -> Result<String, String> {
    match required_value(field, op, pred)? {
        AttrValue::Str(s) => Ok(s.clone()),
        other => Err(format!("op `{op}` on '{field}' needs a string, got {}", other.kind())),
    }
}

fn int_value(field: &str, op: Op, pred: &PredicateDef) -> Result<i64, String> {
    match required_value(field, op, pred)? {
        AttrValue::Int(i) => Ok(*i),
        other => Err(format!("op `{op}` on '{field}' needs an integer, got {}", other.kind())),
    }
}
