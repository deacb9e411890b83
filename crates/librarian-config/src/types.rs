//! Configuration types for librarian.
//!
//! These types carry no dependency on the registry crate. The CLI converts
//! them into registry settings and scan options at startup. Every struct
//! implements [`Default`] so that a bare `[section]` header in TOML produces
//! a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog location and naming rules for local discovery.
    pub library: LibrarySection,
    /// Remote catalog served over HTTP.
    pub remote: RemoteSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// LibrarySection
// ---------------------------------------------------------------------------

/// Local catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    /// First segment every entry ID must carry (e.g. `"lib"`).
    pub root_key: String,
    /// Context tag config documents must declare.
    pub context: String,
    /// Root directory of the catalog. Relative paths resolve against the
    /// workspace.
    pub directory: PathBuf,
    /// How many directory levels below the root are scanned.
    pub search_depth: u32,
    /// Name of the per-directory config document.
    pub manifest_file: String,
    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            root_key: "lib".to_owned(),
            context: "Library".to_owned(),
            directory: PathBuf::from("lib"),
            search_depth: 3,
            manifest_file: "config.json".to_owned(),
            excluded_dirs: vec!["src".to_owned()],
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteSection
// ---------------------------------------------------------------------------

/// Remote catalog settings. Remote discovery is used when `base_url` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Base URL serving `available.json` and `config.json`.
    pub base_url: Option<String>,
    /// Context tag the remote documents carry.
    pub context: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: None,
            context: "Web-Library".to_owned(),
        }
    }
}

impl RemoteSection {
    /// Whether a remote catalog is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["librarian_registry=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sections_fill_defaults() {
        let config: Config = toml::from_str("[library]\n[remote]\n").unwrap();
        assert_eq!(config.library.root_key, "lib");
        assert_eq!(config.library.excluded_dirs, vec!["src"]);
        assert!(!config.remote.is_enabled());
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [library]
            search_depth = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.library.search_depth, 5);
        assert_eq!(config.library.context, "Library");
    }
}
