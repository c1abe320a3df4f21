//! The runner contract and the registry that resolves a runner by name.
//!
//! Runners are an explicit registry of `Arc<dyn Runner>` rather than
//! string-keyed dynamic imports — plugin discovery is an explicit
//! `register` call at process start instead of scanning installed
//! packages' entry points.

pub mod builtin;
pub mod generic;
pub mod library;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

pub use builtin::{BuiltinRunner, BuiltinRunnerError};
pub use generic::{GenericRunner, GenericRunnerError};
pub use library::{LibraryRunner, LibraryRunnerError};

use crate::data::Value;
use crate::node::Node;

/// The one operation every runner exposes: invoke `node` with
/// its resolved `inputs`, returning its named outputs. Runners are stateless
/// w.r.t. the engine and shared, hence `Send + Sync` behind an `Arc`.
pub trait Runner: Send + Sync {
    fn run(
        &self,
        node: &Node,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, RunnerError>;
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Generic(#[from] GenericRunnerError),
    #[error(transparent)]
    Library(#[from] LibraryRunnerError),
    #[error(transparent)]
    Builtin(#[from] BuiltinRunnerError),
}

#[derive(Debug, Error)]
pub enum RunnerRegistryError {
    #[error("runner {0:?} not found")]
    NotFound(String),
}

/// Resolves a runner by name: the three built-ins plus any
/// explicitly registered plugin runners.
pub struct RunnerRegistry {
    builtin: Arc<BuiltinRunner>,
    generic: Arc<GenericRunner>,
    library: Arc<LibraryRunner>,
    plugins: HashMap<String, Arc<dyn Runner>>,
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            builtin: Arc::new(BuiltinRunner),
            generic: Arc::new(GenericRunner),
            library: Arc::new(LibraryRunner),
            plugins: HashMap::new(),
        }
    }

    /// Registers a plugin runner under `name`. The built-in names
    /// `builtin`/`gada`/`generic`/`library` are reserved and always resolve
    /// to the in-tree implementations regardless of what's registered here.
    pub fn register(&mut self, name: impl Into<String>, runner: Arc<dyn Runner>) {
        self.plugins.insert(name.into(), runner);
    }

    /// Resolves `name` to a runner. Unresolved names are fatal.
    pub fn load(&self, name: &str) -> Result<Arc<dyn Runner>, RunnerRegistryError> {
        match name {
            "builtin" | "gada" => Ok(self.builtin.clone()),
            "generic" => Ok(self.generic.clone()),
            "library" => Ok(self.library.clone()),
            other => self
                .plugins
                .get(other)
                .cloned()
                .ok_or_else(|| RunnerRegistryError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_names() {
        let registry = RunnerRegistry::new();
        assert!(registry.load("builtin").is_ok());
        assert!(registry.load("gada").is_ok());
        assert!(registry.load("generic").is_ok());
        assert!(registry.load("library").is_ok());
    }

    #[test]
    fn unknown_runner_is_not_found() {
        let registry = RunnerRegistry::new();
        assert!(matches!(
            registry.load("nope"),
            Err(RunnerRegistryError::NotFound(_))
        ));
    }

    #[test]
    fn registered_plugin_is_resolved_by_name() {
        struct Noop;
        impl Runner for Noop {
            fn run(
                &self,
                _node: &Node,
                _inputs: &BTreeMap<String, Value>,
            ) -> Result<BTreeMap<String, Value>, RunnerError> {
                Ok(BTreeMap::new())
            }
        }

        let mut registry = RunnerRegistry::new();
        registry.register("my-plugin", Arc::new(Noop));
        assert!(registry.load("my-plugin").is_ok());
    }
}
