//! Node records: the typed, immutable description of one callable unit.
//!
//! `Param`/`Node`/`NodePath`/`NodeCall` all own their data outright rather
//! than borrowing from a shared mutable config map, so materializing a node
//! never disturbs the manifest it was built from.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::data::{CanonicalPath, Value};
use crate::manifest::{ManifestStore, ManifestStoreError, NodeManifestEntry, PackageRef, ParamManifestEntry};
use crate::registry::{NodeRegistry, NodeRegistryError};
use crate::typing::{self, Type, TypeParseError};

#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("param {name:?} has invalid type {raw:?}: {source}")]
    InvalidParamType {
        name: String,
        raw: String,
        #[source]
        source: TypeParseError,
    },
    #[error("duplicate param name {0:?} in the same parameter list")]
    DuplicateParamName(String),
}

/// One named, typed argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Option<Value>,
    pub r#type: Type,
    pub help: Option<String>,
}

impl Param {
    /// Builds a `Param` from its manifest entry. Copies every field out of
    /// `entry` rather than consuming/mutating it, so the manifest store's
    /// cached manifest is never disturbed by materializing a node.
    pub fn from_config(entry: &ParamManifestEntry) -> Result<Self, NodeConfigError> {
        let r#type = match &entry.r#type {
            Some(raw) => typing::parse(raw).map_err(|source| NodeConfigError::InvalidParamType {
                name: entry.name.clone(),
                raw: raw.clone(),
                source,
            })?,
            None => Type::default(),
        };
        Ok(Param {
            name: entry.name.clone(),
            value: entry.value.clone(),
            r#type,
            help: entry.help.clone(),
        })
    }
}

fn check_unique_names(params: &[Param]) -> Result<(), NodeConfigError> {
    let mut seen = std::collections::HashSet::new();
    for p in params {
        if !seen.insert(&p.name) {
            return Err(NodeConfigError::DuplicateParamName(p.name.clone()));
        }
    }
    Ok(())
}

/// Handle identifying a resolved package, opaque outside `crate::manifest`.
pub type PackageHandle = crate::manifest::PackageHandle;

/// One callable definition, fully materialized from its manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub module: PackageHandle,
    /// Absolute path, lexically normalized (not fs-canonicalized, since the
    /// file need not exist yet) — see the generic runner's containment check.
    pub file: Option<PathBuf>,
    pub lineno: Option<u64>,
    pub runner: Option<String>,
    pub is_pure: bool,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub extras: BTreeMap<String, serde_yaml::Value>,
}

impl Node {
    /// Builds a `Node` from its manifest entry and resolved package
    /// directory. `package_dir` is used only to resolve a relative `file`
    /// into an absolute one; it is not filesystem-touched here.
    pub fn from_config(
        entry: &NodeManifestEntry,
        module: PackageHandle,
        package_dir: &std::path::Path,
    ) -> Result<Self, NodeConfigError> {
        let inputs = entry
            .inputs
            .iter()
            .map(Param::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        check_unique_names(&inputs)?;

        let outputs = entry
            .outputs
            .iter()
            .map(Param::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        check_unique_names(&outputs)?;

        let file = entry.file.as_ref().map(|relative| {
            crate::data::normalize_lexically(&package_dir.join(relative))
        });

        Ok(Node {
            name: entry.name.clone(),
            module,
            file,
            lineno: entry.lineno,
            runner: entry.runner.clone(),
            is_pure: entry.pure.unwrap_or(false),
            inputs,
            outputs,
            extras: entry.extras.clone(),
        })
    }
}

#[derive(Debug, Error)]
pub enum NodePathError {
    #[error("empty node path")]
    Empty,
}

/// Parses `"a/b/c/name"` into module segments + a name.
///
/// A path with no `/` has no module segments: it resolves against the
/// built-in module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    pub module: Vec<String>,
    pub name: String,
}

impl NodePath {
    pub fn parse(s: &str) -> Result<Self, NodePathError> {
        let mut segments: Vec<String> = s.split('/').map(str::to_string).collect();
        let name = segments.pop().ok_or(NodePathError::Empty)?;
        if name.is_empty() {
            return Err(NodePathError::Empty);
        }
        Ok(NodePath {
            module: segments,
            name,
        })
    }

    /// `true` when this path has no module segments, i.e. it names a node in
    /// the built-in module.
    pub fn is_builtin(&self) -> bool {
        self.module.is_empty()
    }

    /// Resolves this path's module segments to its package's directory
    /// (spec §3: `absolute()` → package directory path). Takes `&mut
    /// ManifestStore` rather than owning the store, matching the crate's
    /// pattern of threading caches through explicitly rather than through
    /// methods that own IO.
    pub fn absolute(&self, store: &mut ManifestStore) -> Result<CanonicalPath, ManifestStoreError> {
        let handle = store.load_module(&PackageRef::Segments(self.module.clone()))?;
        Ok(store.get_module_path(&handle).clone())
    }

    /// Resolves and materializes the [`Node`] this path names (spec §3:
    /// `load()` → Node).
    pub fn load(&self, registry: &mut NodeRegistry) -> Result<Node, NodeRegistryError> {
        registry.load(self)
    }

    /// Whether this path resolves to a node (spec §3: `exists()` → bool).
    /// A missing package also yields `false` rather than propagating the
    /// error, since existence is a yes/no question by contract.
    pub fn exists(&self, registry: &mut NodeRegistry) -> bool {
        self.load(registry).is_ok()
    }
}

/// One step in a program: the call site for a node invocation.
///
/// `inputs` maps parameter name to an expression: a literal [`Value`] or a
/// `{{ id }}` / `{{ id.field }}` template string, both represented here as
/// [`Value::String`] and resolved by [`crate::context::Context`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeCall {
    pub name: String,
    pub id: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    pub file: Option<PathBuf>,
    pub lineno: Option<u64>,
}

/// A completed step's result record.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstance {
    pub node: Node,
    pub step: NodeCall,
    pub outputs: BTreeMap<String, Value>,
}
