//! Programs: ordered node-call sequences with a designated output id.
//!
//! The stepwise interpreter that actually runs a program's steps lives in
//! [`crate::context`]; this module only owns the program's shape and loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::context::{Context, ContextError};
use crate::data::Value;
use crate::manifest::ParamManifestEntry;
use crate::node::{Node, NodeCall, NodeConfigError, Param};
use crate::registry::NodeRegistry;
use crate::runners::RunnerRegistry;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse program file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid program input: {0}")]
    InputParam(#[from] NodeConfigError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// The YAML shape of a program file, distinct from a package manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramManifest {
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ParamManifestEntry>,
    #[serde(default)]
    pub steps: Vec<NodeCall>,
    pub outputs: Option<String>,
}

/// An ordered list of node calls with an optional designated output id.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: Option<String>,
    pub file: Option<PathBuf>,
    pub inputs: Vec<Param>,
    pub steps: Vec<NodeCall>,
    pub outputs: Option<String>,
}

impl Program {
    /// Builds a `Program` from a decoded program file.
    pub fn from_config(
        config: ProgramManifest,
        file: Option<PathBuf>,
    ) -> Result<Self, ProgramError> {
        let inputs = config
            .inputs
            .iter()
            .map(Param::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Program {
            name: config.name,
            file,
            inputs,
            steps: config.steps,
            outputs: config.outputs,
        })
    }

    /// Reads and parses a program file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ProgramManifest =
            serde_yaml::from_str(&text).map_err(|source| ProgramError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_config(config, Some(path.to_path_buf()))
    }

    /// Wraps a single node as a one-step program: the step's id is `"node"`,
    /// every declared input is passed through as `{{ name }}`, and `outputs`
    /// is `"node"`.
    pub fn from_node(node: &Node) -> Self {
        let step_inputs = node
            .inputs
            .iter()
            .map(|p| (p.name.clone(), Value::String(format!("{{{{ {} }}}}", p.name))))
            .collect();

        Program {
            name: Some(node.name.clone()),
            file: None,
            inputs: node.inputs.clone(),
            outputs: Some("node".to_string()),
            steps: vec![NodeCall {
                name: node.name.clone(),
                id: Some("node".to_string()),
                inputs: step_inputs,
                file: None,
                lineno: None,
            }],
        }
    }

    /// Runs the program to completion and, if `outputs` is set, returns the
    /// outputs recorded under that id.
    pub fn run(
        &self,
        inputs: BTreeMap<String, Value>,
        node_registry: &mut NodeRegistry,
        runner_registry: &RunnerRegistry,
    ) -> Result<Option<BTreeMap<String, Value>>, ProgramError> {
        let mut ctx = Context::new(self.steps.clone(), inputs);
        ctx.run_to_completion(node_registry, runner_registry)?;
        Ok(match &self.outputs {
            Some(id) => ctx.node(id).map(|inst| inst.outputs.clone()),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestStore;
    use crate::node::NodePath;

    fn node_registry(store: &mut ManifestStore) -> NodeRegistry {
        NodeRegistry::new(store)
    }

    #[test]
    fn from_node_synthesizes_single_step_program() {
        let mut store = ManifestStore::new(vec![]);
        let mut registry = node_registry(&mut store);
        let node = registry.load(&NodePath::parse("max").unwrap()).unwrap();

        let program = Program::from_node(&node);
        assert_eq!(program.outputs.as_deref(), Some("node"));
        assert_eq!(program.steps.len(), 1);
        assert_eq!(program.steps[0].id.as_deref(), Some("node"));
        assert_eq!(
            program.steps[0].inputs.get("a"),
            Some(&Value::String("{{ a }}".to_string()))
        );
    }

    #[test]
    fn from_node_run_matches_direct_runner_invocation() {
        let mut store = ManifestStore::new(vec![]);
        let mut registry = node_registry(&mut store);
        let runners = RunnerRegistry::new();
        let node = registry.load(&NodePath::parse("max").unwrap()).unwrap();

        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), Value::Int(1));
        inputs.insert("b".to_string(), Value::Int(2));

        let program = Program::from_node(&node);
        let outputs = program
            .run(inputs.clone(), &mut registry, &runners)
            .unwrap()
            .unwrap();

        let runner = runners.load(node.runner.as_deref().unwrap_or("builtin")).unwrap();
        let direct = runner.run(&node, &inputs).unwrap();
        assert_eq!(outputs, direct);
    }

    #[test]
    fn run_with_negative_input_picks_larger() {
        let mut store = ManifestStore::new(vec![]);
        let mut registry = node_registry(&mut store);
        let runners = RunnerRegistry::new();
        let node = registry.load(&NodePath::parse("max").unwrap()).unwrap();
        let program = Program::from_node(&node);

        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), Value::Int(5));
        inputs.insert("b".to_string(), Value::Int(-3));
        let outputs = program.run(inputs, &mut registry, &runners).unwrap().unwrap();
        assert_eq!(outputs.get("out"), Some(&Value::Int(5)));
    }

    #[test]
    fn from_config_parses_program_file_shape() {
        let yaml = r#"
name: min
inputs:
  - name: a
    type: int
  - name: b
    type: int
steps:
  - name: min
    inputs:
      a: "{{ a }}"
      b: "{{ b }}"
"#;
        let config: ProgramManifest = serde_yaml::from_str(yaml).unwrap();
        let program = Program::from_config(config, None).unwrap();
        assert_eq!(program.name.as_deref(), Some("min"));
        assert_eq!(program.inputs.len(), 2);
        assert_eq!(program.steps.len(), 1);
        assert_eq!(program.steps[0].name, "min");
    }
}
