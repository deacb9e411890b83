//! Registry error types.

use std::path::PathBuf;

/// Errors from registry, discovery, and load operations.
///
/// Every variant carries owned, cloneable data: the outcome of a single
/// in-flight load is handed to every caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The string is not a well-formed hierarchical identifier.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// A config is malformed for its declared type.
    #[error("invalid config {id}: {message}")]
    InvalidConfig {
        /// The offending config's ID.
        id: String,
        /// Why the config was rejected.
        message: String,
    },

    /// Arguments passed to a registration call are malformed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// One or more IDs (or a type tag) are already defined.
    #[error("already defined: {}", .0.join(", "))]
    AlreadyDefined(Vec<String>),

    /// Two discovered configs share an ID.
    #[error("catalog corrupted, duplicate ids: {}", .0.join(", "))]
    CorruptedCatalog(Vec<String>),

    /// A child entry's parent package does not exist.
    #[error("Package {parent} has not been found (required by {id})")]
    OrphanEntry {
        /// The entry being constructed.
        id: String,
        /// The parent ID that failed to resolve to a package.
        parent: String,
    },

    /// A different child already occupies a namespace key.
    #[error("{key} already added to {package}")]
    DuplicateKey {
        /// The package whose namespace holds the key.
        package: String,
        /// The contested key.
        key: String,
    },

    /// An alias target is not a well-formed ID.
    #[error("invalid alias target for {id}: {target}")]
    InvalidTarget {
        /// The alias ID.
        id: String,
        /// The rejected target value.
        target: String,
    },

    /// A module's required ID could not be resolved to an entry.
    #[error("dependency {dependency} of {id} could not be resolved")]
    MissingDependency {
        /// The module being loaded.
        id: String,
        /// The unresolved dependency.
        dependency: String,
    },

    /// A module's dependency did not reach the loaded state.
    #[error("dependency {dependency} of {id} failed to load: {message}")]
    DependencyLoadFailed {
        /// The module being loaded.
        id: String,
        /// The dependency that failed.
        dependency: String,
        /// Failure reason.
        message: String,
    },

    /// The `requires`/`target` graph loops back on itself.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// The requested ID cannot be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not available for this registry variant.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A fetched document carried an unexpected `@context`.
    #[error("invalid context {found:?}, expected {expected:?}")]
    InvalidContext {
        /// The context tag the registry expects.
        expected: String,
        /// The context tag that was received.
        found: Option<String>,
    },

    /// I/O failure while reading the catalog.
    #[error("I/O error at {path}: {message}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// A document or unit could not be parsed.
    #[error("parse error in {source_name}: {message}")]
    Parse {
        /// File path or URL of the document.
        source_name: String,
        /// Parse error message.
        message: String,
    },

    /// Remote catalog transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The injected unit loader failed to execute a module.
    #[error("unit load failed for {id}: {message}")]
    UnitLoad {
        /// The module being loaded.
        id: String,
        /// Failure reason.
        message: String,
    },
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error is scoped to a single load attempt and may succeed
    /// on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. }
                | Self::DependencyLoadFailed { .. }
                | Self::UnitLoad { .. }
                | Self::Transport(_)
                | Self::Io { .. }
        )
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_defined_lists_ids() {
        let err = RegistryError::AlreadyDefined(vec!["lib.a".into(), "lib.b".into()]);
        assert_eq!(err.to_string(), "already defined: lib.a, lib.b");
    }

    #[test]
    fn test_orphan_message_names_parent() {
        let err = RegistryError::OrphanEntry {
            id: "lib.a.b".into(),
            parent: "lib.a".into(),
        };
        assert!(err.to_string().starts_with("Package lib.a has not been found"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            RegistryError::MissingDependency {
                id: "lib.m".into(),
                dependency: "lib.d".into(),
            }
            .is_retryable()
        );
        assert!(!RegistryError::CorruptedCatalog(vec!["lib.x".into()]).is_retryable());
        assert!(!RegistryError::InvalidId("1abc".into()).is_retryable());
    }
}
