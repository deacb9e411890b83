#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for librarian.
//!
//! # Usage
//!
//! ```rust,no_run
//! use librarian_config::Config;
//!
//! let resolved = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("scanning {}", resolved.config.library.directory.display());
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`LIBRARIAN_*`)
//! 2. **Explicit file** (`--config FILE`)
//! 3. **Workspace** (`{workspace}/.librarian/config.toml`)
//! 4. **User** (`~/.librarian/config.toml`)
//! 5. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependency on the registry crate. Conversion into
//! registry settings happens in the CLI.

use std::path::{Path, PathBuf};

/// `LIBRARIAN_*` environment overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered merging with source tracking.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::{ConfigLayer, FieldSources};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(workspace_root: Option<&Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, None, None)
    }

    /// Load configuration, merging `file` above the workspace layer.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `file` cannot be read, any layer is
    /// malformed, or the final configuration fails validation.
    pub fn load_with_file(
        workspace_root: Option<&Path>,
        file: &Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, None, Some(file))
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// The catalog directory, resolved against `base` when relative.
    #[must_use]
    pub fn catalog_dir(&self, base: &Path) -> PathBuf {
        if self.library.directory.is_absolute() {
            self.library.directory.clone()
        } else {
            base.join(&self.library.directory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_dir_resolution() {
        let mut config = Config::default();
        assert_eq!(
            config.catalog_dir(Path::new("/work")),
            PathBuf::from("/work/lib")
        );
        config.library.directory = PathBuf::from("/srv/catalog");
        assert_eq!(
            config.catalog_dir(Path::new("/work")),
            PathBuf::from("/srv/catalog")
        );
    }
}
