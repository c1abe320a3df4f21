mod canonical_path;
mod value;

pub use canonical_path::{is_contained_in, normalize_lexically, CanonicalPath, CanonicalizeError};
pub use value::Value;
