//! External subprocess runner: template-driven command execution with
//! directory containment and environment composition.
//!
//! The command template is expanded and then run through
//! `std::process::Command` over `sh -c`, with each substituted argv token
//! passed through `shell-escape` first — joining shell words by hand
//! without escaping is a command-injection hole, and this avoids it.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use super::Runner;
use crate::data::{is_contained_in, Value};
use crate::node::Node;
use crate::runners::RunnerError;

#[derive(Debug, Error)]
pub enum GenericRunnerError {
    #[error("node {node} is missing required extra {extra:?}")]
    MissingExtra { node: String, extra: &'static str },
    #[error("file {file} escapes package directory {package_dir}")]
    Containment {
        file: PathBuf,
        package_dir: PathBuf,
    },
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command:?} exited with status {status}")]
    NonZeroExit { command: String, status: i32 },
    #[error("failed to decode stdout of {command:?} as UTF-8: {source}")]
    InvalidUtf8 {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("failed to parse outputs from stdout of {command:?}: {source}")]
    InvalidOutput {
        command: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn extra_str<'n>(node: &'n Node, key: &str) -> Option<&'n str> {
    node.extras.get(key).and_then(|v| v.as_str())
}

/// Template-driven subprocess execution. Consumes `node.file` (the node's
/// own top-level manifest key, already resolved to an absolute path) plus
/// the extras `bin`, `command` (default `${bin} ${file} ${argv}`), `env`,
/// `cwd`.
pub struct GenericRunner;

impl Runner for GenericRunner {
    fn run(
        &self,
        node: &Node,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, RunnerError> {
        let package_dir: &std::path::Path = node.module.path.as_ref();

        // `file` is a named top-level key in `gada.yml` (spec §6), already
        // resolved to an absolute, lexically normalized path on `Node` by
        // `Node::from_config` — it never appears in `node.extras`, whose
        // flatten only captures keys the struct doesn't already name.
        let file_abs = node
            .file
            .clone()
            .ok_or_else(|| GenericRunnerError::MissingExtra {
                node: node.name.clone(),
                extra: "file",
            })?;
        if !is_contained_in(&file_abs, package_dir) {
            return Err(GenericRunnerError::Containment {
                file: file_abs,
                package_dir: package_dir.to_path_buf(),
            }
            .into());
        }

        let bin = extra_str(node, "bin").ok_or_else(|| GenericRunnerError::MissingExtra {
            node: node.name.clone(),
            extra: "bin",
        })?;

        // additional arguments: the node's declared inputs, in declaration
        // order, shell-escaped so a value containing whitespace or quotes
        // can't break out of its argv slot.
        let argv: Vec<String> = node
            .inputs
            .iter()
            .filter_map(|param| inputs.get(&param.name))
            .map(|v| shell_escape::escape(Cow::Owned(v.to_string())).into_owned())
            .collect();

        let template = extra_str(node, "command")
            .map(str::to_string)
            .unwrap_or_else(|| "${bin} ${file} ${argv}".to_string());
        let command = template
            .replace("${bin}", bin)
            .replace("${file}", &file_abs.to_string_lossy())
            .replace("${argv}", &argv.join(" "));

        let mut env: BTreeMap<String, String> = std::env::vars().collect();
        if let Some(extra_env) = node.extras.get("env").and_then(|v| v.as_mapping()) {
            for (k, v) in extra_env {
                if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                    env.insert(k.to_string(), v.to_string());
                }
            }
        }

        let cwd = extra_str(node, "cwd")
            .map(PathBuf::from)
            .unwrap_or_else(|| package_dir.to_path_buf());

        debug!(%command, node = %node.name, "spawning generic runner subprocess");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .env_clear()
            .envs(&env)
            .current_dir(&cwd)
            .output()
            .map_err(|source| GenericRunnerError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GenericRunnerError::NonZeroExit {
                command,
                status: output.status.code().unwrap_or(-1),
            }
            .into());
        }

        if node.outputs.is_empty() {
            return Ok(BTreeMap::new());
        }

        let stdout =
            String::from_utf8(output.stdout).map_err(|source| GenericRunnerError::InvalidUtf8 {
                command: command.clone(),
                source,
            })?;
        if stdout.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_yaml::from_str(&stdout)
            .map_err(|source| GenericRunnerError::InvalidOutput { command, source }.into())
    }
}
