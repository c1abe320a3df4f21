//! The stepwise interpreter that runs a program's node calls.
//!
//! `Context` is owned outright by a single `Program::run` call rather than
//! shared across threads; the variable-reference template grammar is small
//! and fixed, so it's matched with a hand-written scanner below instead of
//! a regex dependency.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::data::Value;
use crate::node::{Node, NodeCall, NodeInstance, NodePath, NodePathError};
use crate::registry::{NodeRegistry, NodeRegistryError};
use crate::runners::{RunnerError, RunnerRegistry, RunnerRegistryError};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid node name {name:?} at line {lineno}: {source}")]
    InvalidNodeName {
        name: String,
        lineno: u64,
        #[source]
        source: NodePathError,
    },
    #[error("node {name} not found at line {lineno}")]
    NodeNotFound {
        name: String,
        lineno: u64,
        #[source]
        source: NodeRegistryError,
    },
    #[error("runner {runner} not found for node {node}")]
    RunnerNotFound {
        runner: String,
        node: String,
        #[source]
        source: RunnerRegistryError,
    },
    #[error("node {node} failed during execution: {source}")]
    RunnerFailed {
        node: String,
        #[source]
        source: RunnerError,
    },
    #[error("a context that has already failed must not be stepped again")]
    Reused,
}

/// Mutable execution state of a running program. Consumed by running to
/// completion; not resumable after a failed step.
pub struct Context<'p> {
    steps: Vec<NodeCall>,
    sp: usize,
    parent: Option<&'p Context<'p>>,
    vars: BTreeMap<String, Value>,
    node_instances: BTreeMap<String, NodeInstance>,
    failed: bool,
}

impl<'p> Context<'p> {
    pub fn new(steps: Vec<NodeCall>, vars: BTreeMap<String, Value>) -> Self {
        Self {
            steps,
            sp: 0,
            parent: None,
            vars,
            node_instances: BTreeMap::new(),
            failed: false,
        }
    }

    pub fn with_parent(
        steps: Vec<NodeCall>,
        vars: BTreeMap<String, Value>,
        parent: &'p Context<'p>,
    ) -> Self {
        Self {
            steps,
            sp: 0,
            parent: Some(parent),
            vars,
            node_instances: BTreeMap::new(),
            failed: false,
        }
    }

    pub fn parent(&self) -> Option<&Context<'p>> {
        self.parent
    }

    pub fn is_running(&self) -> bool {
        self.sp < self.steps.len()
    }

    pub fn is_done(&self) -> bool {
        !self.is_running()
    }

    /// Source line of the step about to run, or 0 once done.
    pub fn lineno(&self) -> u64 {
        if self.is_running() {
            self.steps[self.sp].lineno.unwrap_or(0)
        } else {
            0
        }
    }

    pub fn locals(&self) -> BTreeMap<String, Value> {
        self.vars.clone()
    }

    /// Variables in this context merged with the parent's (parent first,
    /// self wins on collision).
    pub fn vars(&self) -> BTreeMap<String, Value> {
        let mut merged = self.parent.map(Context::vars).unwrap_or_default();
        merged.extend(self.vars.clone());
        merged
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Self, then parent, by name.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.var(name)))
    }

    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.node_instances.get(id)
    }

    /// Runs the next step and stops. A no-op once `is_done`.
    pub fn step(
        &mut self,
        node_registry: &mut NodeRegistry,
        runner_registry: &RunnerRegistry,
    ) -> Result<(), ContextError> {
        if self.failed {
            return Err(ContextError::Reused);
        }
        if self.is_done() {
            return Ok(());
        }

        let step = self.steps[self.sp].clone();
        let lineno = step.lineno.unwrap_or(0);

        let path = NodePath::parse(&step.name).map_err(|source| {
            self.failed = true;
            ContextError::InvalidNodeName {
                name: step.name.clone(),
                lineno,
                source,
            }
        })?;

        let node = node_registry.load(&path).map_err(|source| {
            self.failed = true;
            ContextError::NodeNotFound {
                name: step.name.clone(),
                lineno,
                source,
            }
        })?;
        trace!(node = %node.name, lineno, "node loaded");

        self.run_step(&node, &step, runner_registry)?;
        self.sp += 1;
        Ok(())
    }

    /// Steps until `is_done`.
    pub fn run_to_completion(
        &mut self,
        node_registry: &mut NodeRegistry,
        runner_registry: &RunnerRegistry,
    ) -> Result<(), ContextError> {
        while !self.is_done() {
            self.step(node_registry, runner_registry)?;
        }
        Ok(())
    }

    fn run_step(
        &mut self,
        node: &Node,
        step: &NodeCall,
        runner_registry: &RunnerRegistry,
    ) -> Result<(), ContextError> {
        if node.is_pure {
            self.store(node, step, BTreeMap::new());
            return Ok(());
        }

        let runner_name = node.runner.as_deref().unwrap_or("builtin");
        let runner = runner_registry.load(runner_name).map_err(|source| {
            self.failed = true;
            ContextError::RunnerNotFound {
                runner: runner_name.to_string(),
                node: node.name.clone(),
                source,
            }
        })?;
        trace!(runner = runner_name, node = %node.name, "runner loaded");

        let inputs = self.gather_inputs(step);
        trace!(node = %node.name, ?inputs, "node inputs gathered");
        let outputs = runner.run(node, &inputs).map_err(|source| {
            self.failed = true;
            ContextError::RunnerFailed {
                node: node.name.clone(),
                source,
            }
        })?;
        trace!(node = %node.name, ?outputs, "node outputs produced");

        self.store(node, step, outputs);
        Ok(())
    }

    fn gather_inputs(&self, step: &NodeCall) -> BTreeMap<String, Value> {
        step.inputs
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v)))
            .collect()
    }

    /// A non-string expression passes through unchanged; a string matching
    /// `{{ id }}` / `{{ id.field }}` resolves to a variable or a prior
    /// step's output; anything else is a literal string. Missing bindings
    /// resolve to `Value::Unit` rather than erroring.
    fn resolve_value(&self, value: &Value) -> Value {
        let Value::String(s) = value else {
            return value.clone();
        };
        match parse_template(s) {
            Some((id, None)) => self.var(&id).cloned().unwrap_or(Value::Unit),
            Some((id, Some(field))) => self
                .node(&id)
                .and_then(|inst| inst.outputs.get(&field))
                .cloned()
                .unwrap_or(Value::Unit),
            None => value.clone(),
        }
    }

    fn store(&mut self, node: &Node, step: &NodeCall, outputs: BTreeMap<String, Value>) {
        self.vars.extend(outputs.clone());
        if let Some(id) = &step.id {
            self.node_instances.insert(
                id.clone(),
                NodeInstance {
                    node: node.clone(),
                    step: step.clone(),
                    outputs,
                },
            );
        }
    }
}

/// Matches `^\s*\{\{\s*(\w+)(?:\.(\w+))?\s*\}\}\s*$` without pulling in a
/// regex dependency for a single fixed pattern.
fn parse_template(s: &str) -> Option<(String, Option<String>)> {
    let mut chars = s.chars().peekable();

    fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
    }
    fn parse_ident(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<String> {
        let mut ident = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                chars.next();
            } else {
                break;
            }
        }
        (!ident.is_empty()).then_some(ident)
    }

    skip_ws(&mut chars);
    if chars.next() != Some('{') || chars.next() != Some('{') {
        return None;
    }
    skip_ws(&mut chars);
    let id = parse_ident(&mut chars)?;

    let mut field = None;
    if chars.peek() == Some(&'.') {
        chars.next();
        field = Some(parse_ident(&mut chars)?);
    }

    skip_ws(&mut chars);
    if chars.next() != Some('}') || chars.next() != Some('}') {
        return None;
    }
    skip_ws(&mut chars);
    if chars.next().is_some() {
        return None;
    }

    Some((id, field))
}
