use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// A path that is guaranteed to be canonicalized.
///
/// Rather than canonicalizing a package directory on every lookup, it is
/// canonicalized once when the package is resolved and carried around as
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Deref, derive_more::AsRef)]
pub struct CanonicalPath(PathBuf);

#[derive(Debug, Error)]
#[error("couldn't canonicalize path {path:?}: {err}")]
pub struct CanonicalizeError {
    pub path: PathBuf,
    #[source]
    pub err: std::io::Error,
}

impl CanonicalPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CanonicalizeError> {
        let canonicalized = std::fs::canonicalize(&path).map_err(|e| CanonicalizeError {
            path: path.as_ref().to_path_buf(),
            err: e,
        })?;
        Ok(Self(canonicalized))
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// A sentinel path for packages that have no real directory on disk —
    /// namely the built-in module, which is synthesized in-process rather
    /// than discovered on the search path.
    pub fn synthetic() -> Self {
        Self(PathBuf::from("<builtin>"))
    }
}

/// Lexically normalize a path, collapsing `.` and `..` segments without
/// touching the filesystem.
///
/// The generic runner's containment check (spec §4.4, §5) must reject a
/// `file` extra such as `"../evil.sh"` *before* any process is spawned and
/// regardless of whether the target file exists, so `fs::canonicalize`
/// (which requires the path to exist) can't be used here.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                },
                Some(Component::RootDir) => {},
                None => out.push(component),
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

/// Whether `path` (after lexical normalization) lies under `root`.
///
/// This is the sole sandboxing guarantee the generic runner makes (spec §5).
pub fn is_contained_in(path: &Path, root: &Path) -> bool {
    normalize_lexically(path).starts_with(normalize_lexically(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_parent_dir_escape() {
        let normalized = normalize_lexically(Path::new("/pkg/../evil.sh"));
        assert_eq!(normalized, Path::new("/evil.sh"));
    }

    #[test]
    fn containment_rejects_escape() {
        assert!(!is_contained_in(
            Path::new("/pkg/../evil.sh"),
            Path::new("/pkg")
        ));
    }

    #[test]
    fn containment_accepts_nested_file() {
        assert!(is_contained_in(
            Path::new("/pkg/src/./run.sh"),
            Path::new("/pkg")
        ));
    }
}
