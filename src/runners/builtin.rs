//! The built-in runner and its in-process node library: `set`, `print`,
//! `min`, `max`.
//!
//! The built-in module has no `gada.yml` on disk, so [`builtin_manifest`]
//! synthesizes the manifest [`crate::manifest::ManifestStore`] would
//! otherwise have read.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use thiserror::Error;

use super::Runner;
use crate::data::Value;
use crate::manifest::{NodeManifestEntry, PackageManifest, ParamManifestEntry};
use crate::node::Node;
use crate::runners::RunnerError;

#[derive(Debug, Error)]
pub enum BuiltinRunnerError {
    #[error("missing {0} node implementation")]
    MissingImplementation(String),
    #[error("{a} and {b} are not comparable")]
    NotComparable { a: String, b: String },
}

fn param(name: &str) -> ParamManifestEntry {
    ParamManifestEntry {
        name: name.to_string(),
        r#type: None,
        value: None,
        help: None,
        nargs: None,
        action: None,
    }
}

fn node_entry(name: &str, inputs: Vec<&str>, outputs: Vec<&str>) -> NodeManifestEntry {
    NodeManifestEntry {
        name: name.to_string(),
        runner: None,
        pure: None,
        file: None,
        lineno: None,
        inputs: inputs.into_iter().map(param).collect(),
        outputs: outputs.into_iter().map(param).collect(),
        extras: Default::default(),
    }
}

/// The manifest of the built-in module, as if `gada.yml` had declared its
/// four nodes explicitly.
pub fn builtin_manifest() -> PackageManifest {
    PackageManifest {
        runner: Some("builtin".to_string()),
        bins: Default::default(),
        nodes: vec![
            node_entry("set", vec!["in"], vec!["out"]),
            node_entry("print", vec!["in"], vec![]),
            node_entry("max", vec!["a", "b"], vec!["out"]),
            node_entry("min", vec!["a", "b"], vec!["out"]),
        ],
    }
}

/// Dispatches on `node.name` to a fixed table of in-process functions.
/// Used when a node's package is the built-in module and no explicit
/// runner is configured.
pub struct BuiltinRunner;

impl Runner for BuiltinRunner {
    fn run(
        &self,
        node: &Node,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, RunnerError> {
        let input = |name: &str| inputs.get(name).cloned().unwrap_or(Value::Unit);

        match node.name.as_str() {
            "set" => {
                let mut out = BTreeMap::new();
                out.insert("out".to_string(), input("in"));
                Ok(out)
            },
            "print" => {
                println!("{}", input("in"));
                Ok(BTreeMap::new())
            },
            "max" | "min" => {
                let a = input("a");
                let b = input("b");
                let ordering = a.partial_cmp_numeric(&b).ok_or_else(|| {
                    BuiltinRunnerError::NotComparable {
                        a: format!("{a:?}"),
                        b: format!("{b:?}"),
                    }
                })?;
                let winner = match (node.name.as_str(), ordering) {
                    ("max", Ordering::Less) => b,
                    ("max", _) => a,
                    ("min", Ordering::Greater) => b,
                    (_, _) => a,
                };
                let mut out = BTreeMap::new();
                out.insert("out".to_string(), winner);
                Ok(out)
            },
            other => Err(BuiltinRunnerError::MissingImplementation(other.to_string()).into()),
        }
    }
}
