//! Gada: a polyglot node runtime.
//!
//! Discovers reusable units of computation ("nodes") packaged as directories
//! on disk, resolves them by name, and executes them either individually or
//! as declaratively wired graphs ("programs"). This crate implements the
//! core: the manifest store, node/runner registries, type system, and
//! execution engine. The CLI front-end, packaging, and sandboxing beyond
//! directory containment are out of scope.

pub mod context;
pub mod data;
pub mod manifest;
pub mod node;
pub mod program;
pub mod registry;
pub mod runners;
pub mod typing;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;

/// The list of directories scanned for packages, threaded explicitly through
/// [`manifest::ManifestStore`]/[`registry::NodeRegistry`] rather than read
/// from a process global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath(pub Vec<PathBuf>);

impl SearchPath {
    /// Reads a `:`-separated list of directories from the named environment
    /// variable. Nothing in the core requires this; it's a convenience for
    /// callers that want `PATH`-like configuration.
    pub fn from_env(var: &str) -> Self {
        let dirs = std::env::var(var)
            .ok()
            .map(|raw| {
                raw.split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        Self(dirs)
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_path_from_env_splits_on_colon() {
        std::env::set_var("GADA_TEST_SEARCH_PATH", "/a:/b:/c");
        let path = SearchPath::from_env("GADA_TEST_SEARCH_PATH");
        std::env::remove_var("GADA_TEST_SEARCH_PATH");
        assert_eq!(
            path.into_vec(),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }

    #[test]
    fn search_path_from_missing_env_is_empty() {
        std::env::remove_var("GADA_TEST_SEARCH_PATH_MISSING");
        let path = SearchPath::from_env("GADA_TEST_SEARCH_PATH_MISSING");
        assert!(path.into_vec().is_empty());
    }
}
