//! Kernel Error Types
//!
//! Compilation errors carry enough context (tree path, offending keys) to
//! diagnose the input without re-running the pass. Compilation is atomic:
//! any `CompileError` means the kernel state is observationally unchanged.

use std::fmt;
use thiserror::Error;

/// Path of mapping-key segments from the root to the site of an error.
///
/// Dotted keys contribute one segment per dot-separated component, so the
/// path of `{"service": {"prod.*.timeout": ...}}` at the wildcard is
/// `service.prod`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePath(Vec<String>);

impl TreePath {
    pub fn root() -> Self {
        TreePath(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TreePath(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

/// Errors surfaced at the `precompile` boundary.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Raw tree malformed: unsupported scalar (NaN float) or invalid key.
    #[error("invalid input at {path}: {reason}")]
    InvalidInput { path: TreePath, reason: String },

    /// Two pattern keys in the same mapping expanded to the same concrete key.
    #[error("pattern collision at {path}: `{first}` and `{second}` both expand to `{key}`")]
    PatternCollision {
        path: TreePath,
        key: String,
        first: String,
        second: String,
    },

    /// A wildcard token has no hierarchy entry at its position.
    #[error("no hierarchy entry for wildcard `{token}` at {context}")]
    UnknownWildcardContext { context: TreePath, token: String },

    /// Traversal depth exceeded the configured limit.
    #[error("tree depth exceeds the configured limit of {limit}")]
    DepthExceeded { limit: usize },

    /// Hierarchy expansion kept producing wildcard names past the depth guard.
    #[error("cyclic hierarchy expansion for `{token}` at {context}")]
    CyclicExpansion { context: TreePath, token: String },

    /// Intern table resource exhaustion. Fatal for the compilation.
    #[error("intern table exhausted: {0}")]
    InternFailure(String),
}

/// Errors surfaced at the `query` boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The named view was never registered.
    #[error("view `{0}` is not registered")]
    ViewNotFound(String),

    /// The legacy raw-config path failed to compile its input.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The view function itself failed. Not memoized; the next call retries.
    #[error("view `{view}` failed: {error}")]
    View { view: String, error: anyhow::Error },
}

/// Errors surfaced when registering views.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// A different function is already registered under this name.
    #[error("a view named `{0}` is already registered")]
    DuplicateView(String),
}

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for queries.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_path_display() {
        assert_eq!(TreePath::root().to_string(), "<root>");
        let path = TreePath::from_segments(["service", "prod"]);
        assert_eq!(path.to_string(), "service.prod");
    }

    #[test]
    fn collision_message_names_both_sources() {
        let err = CompileError::PatternCollision {
            path: TreePath::root(),
            key: "x.t".to_string(),
            first: "*.t".to_string(),
            second: "?.t".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("*.t"));
        assert!(msg.contains("?.t"));
        assert!(msg.contains("x.t"));
    }
}
