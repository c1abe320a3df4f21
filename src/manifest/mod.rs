//! Package manifest shapes (`gada.yml`) and their hand-written structural
//! validation.
//!
//! The wire shape is fixed and small enough to hand-check field by field
//! rather than pull in a full schema-validation engine.

mod store;

pub use store::{ManifestStore, ManifestStoreError, PackageHandle, PackageInfo, PackageRef};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The decoded, still-stringly-typed shape of a `gada.yml` document.
///
/// `Node::from_config`/`Param::from_config` (in `crate::node`) turn this into
/// the strongly typed [`crate::node::Node`]/[`crate::node::Param`] records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bins: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeManifestEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ParamManifestEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ParamManifestEntry>,
    /// Runner-specific keys (`entrypoint`, `bin`, `command`, `env`, `cwd`, ...)
    /// kept verbatim for the runner to interpret.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamManifestEntry {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<crate::data::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// CLI-parser hints, recognized but otherwise inert to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nargs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestValidationError {
    #[error("{path}: expected a mapping")]
    ExpectedMapping { path: String },
    #[error("{path}: expected a sequence")]
    ExpectedSequence { path: String },
    #[error("{path}: expected a string")]
    ExpectedString { path: String },
    #[error("{path}: expected a boolean")]
    ExpectedBool { path: String },
    #[error("{path}: missing required key")]
    MissingKey { path: String },
}

fn expect_mapping<'a>(
    value: &'a serde_yaml::Value,
    path: &str,
) -> Result<&'a serde_yaml::Mapping, ManifestValidationError> {
    value
        .as_mapping()
        .ok_or_else(|| ManifestValidationError::ExpectedMapping {
            path: path.to_string(),
        })
}

fn expect_string(
    value: &serde_yaml::Value,
    path: &str,
) -> Result<&str, ManifestValidationError> {
    value
        .as_str()
        .ok_or_else(|| ManifestValidationError::ExpectedString {
            path: path.to_string(),
        })
}

fn get<'a>(mapping: &'a serde_yaml::Mapping, key: &str) -> Option<&'a serde_yaml::Value> {
    mapping.get(serde_yaml::Value::String(key.to_string()))
}

fn validate_param(value: &serde_yaml::Value, path: &str) -> Result<(), ManifestValidationError> {
    let mapping = expect_mapping(value, path)?;
    let name = get(mapping, "name").ok_or_else(|| ManifestValidationError::MissingKey {
        path: format!("{path}.name"),
    })?;
    expect_string(name, &format!("{path}.name"))?;
    if let Some(t) = get(mapping, "type") {
        expect_string(t, &format!("{path}.type"))?;
    }
    if let Some(help) = get(mapping, "help") {
        expect_string(help, &format!("{path}.help"))?;
    }
    Ok(())
}

fn validate_params(
    value: &serde_yaml::Value,
    path: &str,
) -> Result<(), ManifestValidationError> {
    let seq = value
        .as_sequence()
        .ok_or_else(|| ManifestValidationError::ExpectedSequence {
            path: path.to_string(),
        })?;
    for (i, item) in seq.iter().enumerate() {
        validate_param(item, &format!("{path}[{i}]"))?;
    }
    Ok(())
}

fn validate_node(value: &serde_yaml::Value, path: &str) -> Result<(), ManifestValidationError> {
    let mapping = expect_mapping(value, path)?;
    let name = get(mapping, "name").ok_or_else(|| ManifestValidationError::MissingKey {
        path: format!("{path}.name"),
    })?;
    expect_string(name, &format!("{path}.name"))?;
    if let Some(runner) = get(mapping, "runner") {
        expect_string(runner, &format!("{path}.runner"))?;
    }
    if let Some(pure) = get(mapping, "pure") {
        pure.as_bool()
            .ok_or_else(|| ManifestValidationError::ExpectedBool {
                path: format!("{path}.pure"),
            })?;
    }
    if let Some(file) = get(mapping, "file") {
        expect_string(file, &format!("{path}.file"))?;
    }
    if let Some(inputs) = get(mapping, "inputs") {
        validate_params(inputs, &format!("{path}.inputs"))?;
    }
    if let Some(outputs) = get(mapping, "outputs") {
        validate_params(outputs, &format!("{path}.outputs"))?;
    }
    Ok(())
}

/// Structural check over a freshly parsed `gada.yml` document, reporting
/// the offending key path on failure. Validation errors are fatal; callers
/// should not attempt to partially load a manifest that fails this check.
pub fn validate(raw: &serde_yaml::Value) -> Result<(), ManifestValidationError> {
    if raw.is_null() {
        return Ok(());
    }
    let mapping = expect_mapping(raw, "$")?;
    if let Some(runner) = get(mapping, "runner") {
        expect_string(runner, "$.runner")?;
    }
    if let Some(bins) = get(mapping, "bins") {
        let bins_mapping = expect_mapping(bins, "$.bins")?;
        for (k, v) in bins_mapping {
            let key = k.as_str().unwrap_or("<non-string key>");
            expect_string(v, &format!("$.bins.{key}"))?;
        }
    }
    if let Some(nodes) = get(mapping, "nodes") {
        let seq = nodes
            .as_sequence()
            .ok_or_else(|| ManifestValidationError::ExpectedSequence {
                path: "$.nodes".to_string(),
            })?;
        for (i, node) in seq.iter().enumerate() {
            validate_node(node, &format!("$.nodes[{i}]"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn accepts_minimal_manifest() {
        let raw: serde_yaml::Value = serde_yaml::from_str("nodes:\n  - name: x\n").unwrap();
        validate(&raw).unwrap();
    }

    #[test]
    fn accepts_empty_document() {
        let raw: serde_yaml::Value = serde_yaml::from_str("").unwrap();
        validate(&raw).unwrap();
    }

    #[test]
    fn rejects_node_missing_name() {
        let raw: serde_yaml::Value = serde_yaml::from_str("nodes:\n  - runner: generic\n").unwrap();
        let err = validate(&raw).unwrap_err();
        assert_eq!(
            err,
            ManifestValidationError::MissingKey {
                path: "$.nodes[0].name".to_string()
            }
        );
    }

    #[test]
    fn rejects_wrong_type_for_pure() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("nodes:\n  - name: x\n    pure: \"yes\"\n").unwrap();
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn decodes_extras_verbatim() {
        let manifest: PackageManifest = serde_yaml::from_str(
            "nodes:\n  - name: x\n    entrypoint: pkg.mod:fn\n    bin: python3\n",
        )
        .unwrap();
        let node = &manifest.nodes[0];
        assert_eq!(
            node.extras.get("entrypoint").and_then(|v| v.as_str()),
            Some("pkg.mod:fn")
        );
        assert_eq!(node.extras.get("bin").and_then(|v| v.as_str()), Some("python3"));
    }
}
