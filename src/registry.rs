//! Enumeration and name/path resolution of nodes across packages.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, trace};

use crate::manifest::{
    ManifestStore, ManifestStoreError, NodeManifestEntry, PackageHandle, PackageManifest,
    PackageRef,
};
use crate::node::{Node, NodeConfigError, NodePath};

#[derive(Debug, Error)]
pub enum NodeRegistryError {
    #[error(transparent)]
    Manifest(#[from] ManifestStoreError),
    #[error("node {0:?} not found")]
    NodeNotFound(String),
    #[error("invalid configuration for node {name:?}: {source}")]
    Config {
        name: String,
        #[source]
        source: NodeConfigError,
    },
}

/// Enumerates packages and nodes, and resolves a node by name or path.
/// Threaded through an injected [`ManifestStore`] rather than owning
/// process-global caches, so two independent registries never share state.
pub struct NodeRegistry<'s> {
    store: &'s mut ManifestStore,
}

impl<'s> NodeRegistry<'s> {
    pub fn new(store: &'s mut ManifestStore) -> Self {
        Self { store }
    }

    /// Every directory on the search path that contains a `gada.yml`
    /// (search-path order, then alphabetical within each directory).
    pub fn iter_packages(&mut self) -> Result<Vec<PackageHandle>, NodeRegistryError> {
        Ok(self.store.iter_packages()?)
    }

    /// `(package, node_manifest)` for every entry in each package's `nodes`
    /// list, in declaration order.
    pub fn iter_nodes(
        &mut self,
    ) -> Result<Vec<(PackageHandle, NodeManifestEntry)>, NodeRegistryError> {
        let mut out = Vec::new();
        for handle in self.iter_packages()? {
            let manifest = self.store.load_module_config(&handle)?.clone();
            for entry in manifest.nodes {
                out.push((handle.clone(), entry));
            }
        }
        Ok(out)
    }

    /// First match by the node's `name` field across all packages, in
    /// discovery order. Returns `Ok(None)` rather than the last node
    /// iterated when nothing matches.
    pub fn find_node(&mut self, name: &str) -> Result<Option<Node>, NodeRegistryError> {
        for (handle, entry) in self.iter_nodes()? {
            if entry.name == name {
                return Ok(Some(self.materialize(&handle, &entry)?));
            }
        }
        Ok(None)
    }

    /// Resolves `path`'s package, then searches its node list for a matching
    /// name, materializing and caching the result.
    pub fn load(&mut self, path: &NodePath) -> Result<Node, NodeRegistryError> {
        let handle = self
            .store
            .load_module(&PackageRef::Segments(path.module.clone()))?;

        if let Some(cached) = self.store.get_cached_node(&handle, &path.name) {
            trace!(node = %path.name, package = %handle.name, "node cache hit");
            return Ok(cached.clone());
        }

        let manifest = self.store.load_module_config(&handle)?.clone();
        let entry = manifest
            .nodes
            .into_iter()
            .find(|n| n.name == path.name)
            .ok_or_else(|| NodeRegistryError::NodeNotFound(path.name.clone()))?;

        self.materialize(&handle, &entry)
    }

    fn materialize(
        &mut self,
        handle: &PackageHandle,
        entry: &NodeManifestEntry,
    ) -> Result<Node, NodeRegistryError> {
        if let Some(cached) = self.store.get_cached_node(handle, &entry.name) {
            return Ok(cached.clone());
        }

        let manifest = self.store.load_module_config(handle)?.clone();
        let package_dir: PathBuf = handle.path.as_ref().clone();

        let mut node = Node::from_config(entry, handle.clone(), &package_dir).map_err(|source| {
            NodeRegistryError::Config {
                name: entry.name.clone(),
                source,
            }
        })?;

        // A node's runner defaults to the package's default runner, and only
        // then to "builtin" (applied lazily by the context).
        if node.runner.is_none() {
            node.runner = manifest.runner.clone();
        }
        resolve_bin_extra(&mut node, &manifest);

        debug!(node = %node.name, package = %handle.name, "materialized node");
        self.store
            .set_cached_node(handle, entry.name.clone(), node.clone());
        Ok(node)
    }
}

/// Remaps a node's `bin` extra through the package's `bins` table, mapping
/// short binary names to resolved paths. Done once at materialization time
/// so the generic runner itself stays stateless and never needs the
/// package manifest.
fn resolve_bin_extra(node: &mut Node, manifest: &PackageManifest) {
    if manifest.bins.is_empty() {
        return;
    }
    let Some(bin_name) = node.extras.get("bin").and_then(|v| v.as_str()) else {
        return;
    };
    if let Some(resolved) = manifest.bins.get(bin_name) {
        node.extras.insert(
            "bin".to_string(),
            serde_yaml::Value::String(resolved.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::manifest::ManifestStore;

    fn write_manifest(dir: &std::path::Path, contents: &str) {
        std::fs::write(dir.join("gada.yml"), contents).unwrap();
    }

    #[test]
    fn loads_node_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: x\n    inputs:\n      - name: a\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let mut registry = NodeRegistry::new(&mut store);
        let node = registry.load(&NodePath::parse("mypkg/x").unwrap()).unwrap();
        assert_eq!(node.name, "x");
        assert_eq!(node.inputs.len(), 1);
    }

    #[test]
    fn missing_node_in_existing_package_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: x\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let mut registry = NodeRegistry::new(&mut store);
        let err = registry
            .load(&NodePath::parse("mypkg/y").unwrap())
            .unwrap_err();
        assert!(matches!(err, NodeRegistryError::NodeNotFound(_)));
    }

    #[test]
    fn find_node_returns_none_on_no_match_rather_than_the_last_node() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: a\n  - name: b\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let mut registry = NodeRegistry::new(&mut store);
        assert_eq!(registry.find_node("nope").unwrap(), None);
        assert_eq!(registry.find_node("b").unwrap().unwrap().name, "b");
    }

    #[test]
    fn node_runner_defaults_to_package_runner() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "runner: generic\nnodes:\n  - name: x\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let mut registry = NodeRegistry::new(&mut store);
        let node = registry.load(&NodePath::parse("mypkg/x").unwrap()).unwrap();
        assert_eq!(node.runner.as_deref(), Some("generic"));
    }

    #[test]
    fn bin_extra_is_remapped_through_package_bins() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(
            &pkg_dir,
            indoc! {"
                bins:
                  python: /usr/bin/python3.11
                nodes:
                  - name: x
                    bin: python
            "},
        );

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let mut registry = NodeRegistry::new(&mut store);
        let node = registry.load(&NodePath::parse("mypkg/x").unwrap()).unwrap();
        assert_eq!(
            node.extras.get("bin").and_then(|v| v.as_str()),
            Some("/usr/bin/python3.11")
        );
    }
}
