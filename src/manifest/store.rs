//! Package resolution and manifest caching.
//!
//! Packages, their directories, their parsed manifests, and their
//! materialized nodes are each memoized in their own map keyed by package
//! handle, all owned by one explicit, injectable store rather than a
//! process-global cache, so two independent stores never share state.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use super::{validate, ManifestValidationError, PackageManifest};
use crate::data::CanonicalPath;
use crate::node::Node;

/// The built-in module's synthetic name (`gada._lang` in the original
/// source): the home of `set`/`print`/`min`/`max`.
pub const BUILTIN_MODULE_NAME: &str = "_lang";

/// A resolved package: directory, identity, and manifest path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageInfo {
    pub name: String,
    pub path: CanonicalPath,
    pub manifest_path: PathBuf,
}

/// Cheap-to-clone handle to a resolved package; the unit every cache keys on.
#[derive(Debug, Clone, derive_more::Deref)]
pub struct PackageHandle(Arc<PackageInfo>);

impl PartialEq for PackageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for PackageHandle {}
impl std::hash::Hash for PackageHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

/// A package reference, collapsed into a tagged union at the manifest store
/// boundary: a bare name, already-split
/// segments (as produced by [`crate::node::NodePath`]), or an
/// already-resolved handle.
#[derive(Debug, Clone)]
pub enum PackageRef {
    /// A dotted or bare identifier, e.g. `"a.b.c"` or `"mypkg"`.
    Name(String),
    /// Path segments, e.g. `["a", "b", "c"]` (as produced by splitting a
    /// [`crate::node::NodePath`]'s module component).
    Segments(Vec<String>),
    Handle(PackageHandle),
}

impl From<&str> for PackageRef {
    fn from(s: &str) -> Self {
        PackageRef::Name(s.to_string())
    }
}

impl From<String> for PackageRef {
    fn from(s: String) -> Self {
        PackageRef::Name(s)
    }
}

impl From<Vec<String>> for PackageRef {
    fn from(segments: Vec<String>) -> Self {
        PackageRef::Segments(segments)
    }
}

impl From<PackageHandle> for PackageRef {
    fn from(handle: PackageHandle) -> Self {
        PackageRef::Handle(handle)
    }
}

impl PackageRef {
    /// A key stable across equal refs, used to memoize resolution (the
    /// "module" cache). Not used for already-resolved handles, which need no
    /// further resolution.
    fn cache_key(&self) -> Option<String> {
        match self {
            PackageRef::Name(name) => Some(name.clone()),
            PackageRef::Segments(segments) => Some(segments.join("/")),
            PackageRef::Handle(_) => None,
        }
    }

    fn segments(&self) -> Vec<String> {
        match self {
            PackageRef::Name(name) => name.split(['.', '/']).map(str::to_string).collect(),
            PackageRef::Segments(segments) => segments.clone(),
            PackageRef::Handle(handle) => vec![handle.name.clone()],
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestStoreError {
    #[error("package {0:?} not found on the search path")]
    NotFound(String),
    #[error("failed to read manifest at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest at {path} failed validation: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ManifestValidationError,
    },
}

/// Locates packages on a search path, and reads/writes/caches their
/// manifests. Threaded explicitly through callers rather than kept as a
/// process global, so two independent stores never share state.
pub struct ManifestStore {
    search_path: Vec<PathBuf>,
    modules: HashMap<String, PackageHandle>,
    directories: HashMap<String, CanonicalPath>,
    manifests: HashMap<String, PackageManifest>,
    nodes: HashMap<(String, String), Node>,
}

impl ManifestStore {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            modules: HashMap::new(),
            directories: HashMap::new(),
            manifests: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    fn handle_key(handle: &PackageHandle) -> String {
        handle.path.as_ref().to_string_lossy().into_owned()
    }

    /// Resolves a [`PackageRef`] to a [`PackageHandle`], searching
    /// `search_path` in order the first time a given ref is seen.
    pub fn load_module(&mut self, r#ref: &PackageRef) -> Result<PackageHandle, ManifestStoreError> {
        if let PackageRef::Handle(handle) = r#ref {
            return Ok(handle.clone());
        }

        let segments = r#ref.segments();
        if segments.is_empty() || segments == [""] {
            return Ok(self.builtin_handle());
        }

        let cache_key = r#ref.cache_key().expect("non-handle refs have a cache key");
        if let Some(handle) = self.modules.get(&cache_key) {
            trace!(%cache_key, "module cache hit");
            return Ok(handle.clone());
        }

        for root in &self.search_path.clone() {
            let mut candidate = root.clone();
            for segment in &segments {
                candidate.push(segment);
            }
            let manifest_path = candidate.join("gada.yml");
            if manifest_path.is_file() {
                let canonical = CanonicalPath::new(&candidate).map_err(|e| ManifestStoreError::Io {
                    path: candidate.clone(),
                    source: e.err,
                })?;
                let info = PackageInfo {
                    name: segments.join("/"),
                    path: canonical,
                    manifest_path,
                };
                let handle = PackageHandle(Arc::new(info));
                debug!(package = %cache_key, path = %handle.path.display(), "resolved package");
                self.modules.insert(cache_key, handle.clone());
                self.directories
                    .insert(Self::handle_key(&handle), handle.path.clone());
                return Ok(handle);
            }
        }

        Err(ManifestStoreError::NotFound(cache_key))
    }

    fn builtin_handle(&mut self) -> PackageHandle {
        if let Some(handle) = self.modules.get(BUILTIN_MODULE_NAME) {
            return handle.clone();
        }
        // The built-in module has no manifest file on disk; its directory is
        // a sentinel that never resolves to a real path.
        let info = PackageInfo {
            name: BUILTIN_MODULE_NAME.to_string(),
            path: CanonicalPath::synthetic(),
            manifest_path: PathBuf::from(BUILTIN_MODULE_NAME).join("gada.yml"),
        };
        let handle = PackageHandle(Arc::new(info));
        self.modules
            .insert(BUILTIN_MODULE_NAME.to_string(), handle.clone());
        handle
    }

    /// Cached absolute directory of an already-resolved handle, populated
    /// once in [`Self::load_module`].
    pub fn get_module_path(&self, handle: &PackageHandle) -> &CanonicalPath {
        self.directories
            .get(&Self::handle_key(handle))
            .unwrap_or(&handle.path)
    }

    /// Reads and YAML-decodes `gada.yml`. A missing file yields an empty
    /// manifest; malformed YAML or a schema violation is fatal.
    pub fn load_module_config(
        &mut self,
        handle: &PackageHandle,
    ) -> Result<&PackageManifest, ManifestStoreError> {
        let key = Self::handle_key(handle);
        if self.manifests.contains_key(&key) {
            trace!(package = %handle.name, "manifest cache hit");
            return Ok(&self.manifests[&key]);
        }

        if handle.name == BUILTIN_MODULE_NAME {
            let manifest = crate::runners::builtin::builtin_manifest();
            self.manifests.insert(key.clone(), manifest);
            return Ok(&self.manifests[&key]);
        }

        let manifest = if handle.manifest_path.is_file() {
            let text =
                std::fs::read_to_string(&handle.manifest_path).map_err(|source| ManifestStoreError::Io {
                    path: handle.manifest_path.clone(),
                    source,
                })?;
            let raw: serde_yaml::Value =
                serde_yaml::from_str(&text).map_err(|source| ManifestStoreError::Parse {
                    path: handle.manifest_path.clone(),
                    source,
                })?;
            validate(&raw).map_err(|source| ManifestStoreError::Validation {
                path: handle.manifest_path.clone(),
                source,
            })?;
            serde_yaml::from_value(raw).map_err(|source| ManifestStoreError::Parse {
                path: handle.manifest_path.clone(),
                source,
            })?
        } else {
            debug!(path = %handle.manifest_path.display(), "no manifest file, using empty manifest");
            PackageManifest::default()
        };

        self.manifests.insert(key.clone(), manifest);
        Ok(&self.manifests[&key])
    }

    /// Writes `manifest` as YAML to `gada.yml`, creating the file if absent,
    /// and invalidates the cached manifest so the next read reflects it.
    pub fn dump_module_config(
        &mut self,
        handle: &PackageHandle,
        manifest: &PackageManifest,
    ) -> Result<(), ManifestStoreError> {
        let text = serde_yaml::to_string(manifest).expect("PackageManifest always serializes");
        std::fs::write(&handle.manifest_path, text).map_err(|source| ManifestStoreError::Io {
            path: handle.manifest_path.clone(),
            source,
        })?;
        self.manifests.remove(&Self::handle_key(handle));
        Ok(())
    }

    pub fn get_cached_node(&self, handle: &PackageHandle, name: &str) -> Option<&Node> {
        self.nodes.get(&(Self::handle_key(handle), name.to_string()))
    }

    pub fn set_cached_node(&mut self, handle: &PackageHandle, name: String, node: Node) {
        self.nodes.insert((Self::handle_key(handle), name), node);
    }

    /// Wipes every cache (module, directory, manifest, node).
    pub fn clear_cache(&mut self) {
        self.modules.clear();
        self.directories.clear();
        self.manifests.clear();
        self.nodes.clear();
    }

    /// Every directory on the search path that contains a `gada.yml`, in
    /// search-path order then alphabetically within each directory.
    pub fn iter_packages(&mut self) -> Result<Vec<PackageHandle>, ManifestStoreError> {
        let mut handles = Vec::new();
        for root in self.search_path.clone() {
            let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(&root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().join("gada.yml").is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            entries.sort();
            for dir in entries {
                let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                let handle = self.load_module(&PackageRef::Name(name))?;
                handles.push(handle);
            }
        }
        Ok(handles)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, contents: &str) {
        std::fs::write(dir.join("gada.yml"), contents).unwrap();
    }

    #[test]
    fn resolves_package_on_search_path() {
        crate::test_support::init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: x\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let handle = store.load_module(&PackageRef::Name("mypkg".to_string())).unwrap();
        assert_eq!(handle.name, "mypkg");
    }

    #[test]
    fn get_module_path_returns_cached_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: x\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let handle = store.load_module(&PackageRef::Name("mypkg".to_string())).unwrap();
        assert_eq!(
            store.get_module_path(&handle).as_ref(),
            std::fs::canonicalize(&pkg_dir).unwrap()
        );
    }

    #[test]
    fn missing_package_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let err = store
            .load_module(&PackageRef::Name("nope".to_string()))
            .unwrap_err();
        assert!(matches!(err, ManifestStoreError::NotFound(_)));
    }

    #[test]
    fn missing_manifest_file_yields_empty_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        // gada.yml does not exist; load_module itself requires it to exist to
        // discover the package, so we construct the handle directly here to
        // exercise the "file vanished after discovery" path.
        let handle = PackageHandle(Arc::new(PackageInfo {
            name: "mypkg".to_string(),
            path: CanonicalPath::new(&pkg_dir).unwrap(),
            manifest_path: pkg_dir.join("gada.yml"),
        }));
        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let manifest = store.load_module_config(&handle).unwrap();
        assert_eq!(manifest, &PackageManifest::default());
    }

    #[test]
    fn dump_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes:\n  - name: x\n");

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let handle = store.load_module(&PackageRef::Name("mypkg".to_string())).unwrap();

        let mut manifest = store.load_module_config(&handle).unwrap().clone();
        manifest.nodes.push(super::super::NodeManifestEntry {
            name: "y".to_string(),
            runner: None,
            pure: None,
            file: None,
            lineno: None,
            inputs: vec![],
            outputs: vec![],
            extras: BTreeMap::new(),
        });
        store.dump_module_config(&handle, &manifest).unwrap();

        let reloaded = store.load_module_config(&handle).unwrap();
        assert_eq!(reloaded.nodes.len(), 2);

        // spec.md testable property #6: after the round-trip,
        // `NodePath("<m>/x").exists()` is true for the newly dumped node.
        let mut registry = crate::registry::NodeRegistry::new(&mut store);
        let path = crate::node::NodePath::parse("mypkg/y").unwrap();
        assert!(path.exists(&mut registry));
    }

    #[test]
    fn malformed_yaml_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg_dir = tmp.path().join("mypkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, "nodes: [this is not", );

        let mut store = ManifestStore::new(vec![tmp.path().to_path_buf()]);
        let handle = store.load_module(&PackageRef::Name("mypkg".to_string())).unwrap();
        assert!(store.load_module_config(&handle).is_err());
    }

    #[test]
    fn builtin_module_resolves_without_a_search_path() {
        let mut store = ManifestStore::new(vec![]);
        let handle = store.load_module(&PackageRef::Segments(vec![])).unwrap();
        assert_eq!(handle.name, BUILTIN_MODULE_NAME);
        let manifest = store.load_module_config(&handle).unwrap();
        assert!(manifest.nodes.iter().any(|n| n.name == "max"));
    }
}
