//! In-process dynamic-library runner: loads a shared object and calls a
//! named symbol through a fixed C ABI.
//!
//! A compiled host has no dynamic attribute lookup, so there is only one
//! shape of "call into a dynamically loaded shared library" rather than a
//! split between a module-attribute convention and a raw `dlopen`/`dlsym`
//! one: this runner covers both via `libloading`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use libloading::{Library, Symbol};
use thiserror::Error;
use tracing::debug;

use super::Runner;
use crate::data::Value;
use crate::node::Node;
use crate::runners::RunnerError;

#[derive(Debug, Error)]
pub enum LibraryRunnerError {
    #[error("node {0} is missing the required `entrypoint` extra")]
    MissingEntrypoint(String),
    #[error("entrypoint {0:?} is not of the form \"path#symbol\"")]
    MalformedEntrypoint(String),
    #[error("failed to serialize inputs for node {0}: {1}")]
    SerializeInputs(String, serde_yaml::Error),
    #[error("failed to load library {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("symbol {symbol:?} not found in {path:?}: {source}")]
    Symbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
    #[error("entrypoint {0:?} returned a null result")]
    NullResult(String),
    #[error("failed to decode outputs returned by {0:?}: {1}")]
    DecodeOutputs(String, serde_yaml::Error),
}

/// The fixed C ABI a `library` runner entrypoint must implement: it receives
/// a pointer/length to YAML-encoded inputs and returns an owned
/// [`GadaOutputs`] (or null on failure). The returned buffer must be backed
/// by a `Vec<u8>` boxed via `Box::into_raw`/`Vec::into_raw_parts` — this
/// runner reclaims it with `Box::from_raw`/`Vec::from_raw_parts`, so both
/// sides of the FFI boundary must agree on that allocation shape (the usual
/// caveat for `dlopen`-style plugins compiled against a compatible runtime).
#[repr(C)]
pub struct GadaOutputs {
    pub ptr: *mut u8,
    pub len: usize,
}

type Entrypoint = unsafe extern "C" fn(*const u8, usize) -> *mut GadaOutputs;

/// Dynamically loads a shared object named by `extras.entrypoint`
/// (`path#symbol`, path relative to the package directory) and calls the
/// symbol with the node's inputs YAML-encoded.
pub struct LibraryRunner;

impl Runner for LibraryRunner {
    fn run(
        &self,
        node: &Node,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, RunnerError> {
        let entrypoint = node
            .extras
            .get("entrypoint")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LibraryRunnerError::MissingEntrypoint(node.name.clone()))?;

        let (path_part, symbol_name) = entrypoint
            .split_once('#')
            .ok_or_else(|| LibraryRunnerError::MalformedEntrypoint(entrypoint.to_string()))?;

        let package_dir: &std::path::Path = node.module.path.as_ref();
        let library_path = package_dir.join(path_part);

        let encoded_inputs = serde_yaml::to_string(inputs)
            .map_err(|e| LibraryRunnerError::SerializeInputs(node.name.clone(), e))?;

        debug!(
            path = %library_path.display(),
            symbol = symbol_name,
            "loading library runner entrypoint"
        );

        // SAFETY: the entrypoint contract is documented on `GadaOutputs`;
        // this crate cannot itself guarantee a third-party `.so` upholds it.
        let raw_bytes = unsafe {
            let library =
                Library::new(&library_path).map_err(|source| LibraryRunnerError::Load {
                    path: library_path.clone(),
                    source,
                })?;
            let func: Symbol<Entrypoint> =
                library
                    .get(symbol_name.as_bytes())
                    .map_err(|source| LibraryRunnerError::Symbol {
                        path: library_path.clone(),
                        symbol: symbol_name.to_string(),
                        source,
                    })?;

            let raw = func(encoded_inputs.as_ptr(), encoded_inputs.len());
            if raw.is_null() {
                return Err(LibraryRunnerError::NullResult(node.name.clone()).into());
            }
            let boxed = Box::from_raw(raw);
            Vec::from_raw_parts(boxed.ptr, boxed.len, boxed.len)
        };

        serde_yaml::from_slice(&raw_bytes)
            .map_err(|e| LibraryRunnerError::DecodeOutputs(node.name.clone(), e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestStore, PackageRef};

    fn node_with_extras(extras: BTreeMap<String, serde_yaml::Value>) -> Node {
        let mut store = ManifestStore::new(vec![]);
        let handle = store.load_module(&PackageRef::Segments(vec![])).unwrap();
        Node {
            name: "run".to_string(),
            module: handle,
            file: None,
            lineno: None,
            runner: Some("library".to_string()),
            is_pure: false,
            inputs: vec![],
            outputs: vec![],
            extras,
        }
    }

    #[test]
    fn missing_entrypoint_is_fatal() {
        let node = node_with_extras(BTreeMap::new());
        let err = LibraryRunner.run(&node, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Library(LibraryRunnerError::MissingEntrypoint(_))
        ));
    }

    #[test]
    fn malformed_entrypoint_is_fatal() {
        let mut extras = BTreeMap::new();
        extras.insert(
            "entrypoint".to_string(),
            serde_yaml::Value::String("no_hash_here".to_string()),
        );
        let node = node_with_extras(extras);
        let err = LibraryRunner.run(&node, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Library(LibraryRunnerError::MalformedEntrypoint(_))
        ));
    }

    #[test]
    fn missing_shared_object_is_fatal() {
        let mut extras = BTreeMap::new();
        extras.insert(
            "entrypoint".to_string(),
            serde_yaml::Value::String("nope.so#run".to_string()),
        );
        let node = node_with_extras(extras);
        let err = LibraryRunner.run(&node, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Library(LibraryRunnerError::Load { .. })
        ));
    }
}
