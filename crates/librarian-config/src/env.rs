//! `LIBRARIAN_*` environment overrides.
//!
//! Environment variables are the last layer: a set variable replaces
//! whatever the files configured.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// How a variable's text is turned into a TOML value.
#[derive(Clone, Copy)]
enum Kind {
    Text,
    Integer,
    /// Comma-separated list; empty items are dropped.
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "LIBRARIAN_ROOT_KEY",
        field_path: "library.root_key",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_CONTEXT",
        field_path: "library.context",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_DIR",
        field_path: "library.directory",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_SEARCH_DEPTH",
        field_path: "library.search_depth",
        kind: Kind::Integer,
    },
    EnvMapping {
        var_name: "LIBRARIAN_MANIFEST_FILE",
        field_path: "library.manifest_file",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_EXCLUDED_DIRS",
        field_path: "library.excluded_dirs",
        kind: Kind::List,
    },
    EnvMapping {
        var_name: "LIBRARIAN_REMOTE_URL",
        field_path: "remote.base_url",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_REMOTE_CONTEXT",
        field_path: "remote.context",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::Text,
    },
    EnvMapping {
        var_name: "LIBRARIAN_LOG_FORMAT",
        field_path: "logging.format",
        kind: Kind::Text,
    },
];

/// Snapshot the `LIBRARIAN_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("LIBRARIAN_"))
        .collect()
}

/// Apply every mapped variable present in `env_vars` to `merged`.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if an integer variable does not parse.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        let value = coerce(mapping, raw)?;
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    match mapping.kind {
        Kind::Text => Ok(toml::Value::String(raw.to_owned())),
        Kind::Integer => {
            raw.trim()
                .parse::<i64>()
                .map(toml::Value::Integer)
                .map_err(|e| ConfigError::EnvError {
                    var_name: mapping.var_name.to_owned(),
                    message: format!("expected an integer: {e}"),
                })
        },
        Kind::List => Ok(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| toml::Value::String(item.to_owned()))
                .collect(),
        )),
    }
}

/// Set a dotted `path` in the tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), value);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut merged: toml::Value = toml::from_str("[library]\nroot_key = \"lib\"\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("library.root_key".to_owned(), ConfigLayer::User);

        let count = apply_env_overrides(
            &mut merged,
            &mut sources,
            &vars(&[("LIBRARIAN_ROOT_KEY", "app")]),
        )
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(merged["library"]["root_key"].as_str(), Some("app"));
        assert_eq!(
            sources.get("library.root_key"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_typed_coercion() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        apply_env_overrides(
            &mut merged,
            &mut sources,
            &vars(&[
                ("LIBRARIAN_SEARCH_DEPTH", " 7 "),
                ("LIBRARIAN_EXCLUDED_DIRS", "src, dist,,"),
                ("LIBRARIAN_REMOTE_URL", "http://localhost:8080"),
            ]),
        )
        .unwrap();

        assert_eq!(merged["library"]["search_depth"].as_integer(), Some(7));
        let dirs = merged["library"]["excluded_dirs"].as_array().unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(
            merged["remote"]["base_url"].as_str(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn test_bad_integer_is_rejected() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let err = apply_env_overrides(
            &mut merged,
            &mut FieldSources::new(),
            &vars(&[("LIBRARIAN_SEARCH_DEPTH", "deep")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { ref var_name, .. } if var_name == "LIBRARIAN_SEARCH_DEPTH"));
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let count = apply_env_overrides(
            &mut merged,
            &mut FieldSources::new(),
            &vars(&[("HOME", "/root")]),
        )
        .unwrap();
        assert_eq!(count, 0);
    }
}
