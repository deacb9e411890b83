//! Config records and catalog documents.
//!
//! A config is the immutable descriptor of one namespace entry:
//!
//! ```json
//! { "@id": "lib.core.is:0.1.0", "@type": "Module",
//!   "path": "src/is_0.1.0.json", "requires": ["lib.core.base"] }
//! ```
//!
//! Documents wrap one config, or several under `@graph`, and carry an
//! `@context` tag naming the library they belong to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::exports::ScriptFn;
use crate::id::{self, EntryId, TypeTag};

/// JSON key holding the config ID.
pub const ID_KEY: &str = "@id";
/// JSON key holding the type tag.
pub const TYPE_KEY: &str = "@type";
/// JSON key holding an embedded value.
pub const VALUE_KEY: &str = "@value";
/// JSON key holding a document's library context.
pub const CONTEXT_KEY: &str = "@context";
/// JSON key holding a document's config list.
pub const GRAPH_KEY: &str = "@graph";

/// A declarative descriptor for one entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// The entry's ID.
    #[serde(rename = "@id")]
    pub id: EntryId,
    /// The entry's type tag.
    #[serde(rename = "@type")]
    pub type_tag: TypeTag,
    /// Type-specific fields (`path`, `target`, `requires`, `@value`, ...).
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Callable supplied in-process for `Script` configs.
    #[serde(skip)]
    pub script: Option<ScriptFn>,
}

impl EntryConfig {
    /// Create a config with an empty payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` or `type_tag` is malformed.
    pub fn new(id: &str, type_tag: &str) -> RegistryResult<Self> {
        Ok(Self {
            id: EntryId::new(id)?,
            type_tag: TypeTag::new(type_tag)?,
            payload: serde_json::Map::new(),
            script: None,
        })
    }

    /// A `Package` config.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is malformed.
    pub fn package(id: &str) -> RegistryResult<Self> {
        Self::new(id, TypeTag::PACKAGE)
    }

    /// A `Module` config loading `path` after `requires`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is malformed.
    pub fn module(id: &str, path: &str, requires: &[&str]) -> RegistryResult<Self> {
        let mut config = Self::new(id, TypeTag::MODULE)?;
        config.payload.insert("path".into(), path.into());
        if !requires.is_empty() {
            config.payload.insert(
                "requires".into(),
                requires.iter().map(|r| serde_json::Value::from(*r)).collect(),
            );
        }
        Ok(config)
    }

    /// An `Alias` config forwarding to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is malformed.
    pub fn alias(id: &str, target: &str) -> RegistryResult<Self> {
        let mut config = Self::new(id, TypeTag::ALIAS)?;
        config.payload.insert("target".into(), target.into());
        Ok(config)
    }

    /// A `Script` config wrapping `script`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is malformed.
    pub fn script(id: &str, script: ScriptFn) -> RegistryResult<Self> {
        let mut config = Self::new(id, TypeTag::SCRIPT)?;
        config.script = Some(script);
        Ok(config)
    }

    /// A raw `Config` value.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is malformed.
    pub fn value(id: &str, value: serde_json::Value) -> RegistryResult<Self> {
        let mut config = Self::new(id, TypeTag::CONFIG)?;
        config.payload.insert(VALUE_KEY.into(), value);
        Ok(config)
    }

    /// The `path` field, if it is a string.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.payload.get("path").and_then(serde_json::Value::as_str)
    }

    /// The raw `target` field.
    #[must_use]
    pub fn target(&self) -> Option<&serde_json::Value> {
        self.payload.get("target")
    }

    /// The raw `requires` field.
    #[must_use]
    pub fn requires(&self) -> Option<&serde_json::Value> {
        self.payload.get("requires")
    }

    /// The embedded `@value`.
    #[must_use]
    pub fn value_field(&self) -> Option<&serde_json::Value> {
        self.payload.get(VALUE_KEY)
    }

    /// IDs this config points at: `requires` for modules, `target` for
    /// aliases. Malformed entries are skipped.
    #[must_use]
    pub fn edges(&self) -> Vec<EntryId> {
        let mut edges = Vec::new();
        if let Some(serde_json::Value::Array(items)) = self.requires() {
            edges.extend(
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .filter_map(|s| EntryId::new(s).ok()),
            );
        }
        if let Some(target) = self.target().and_then(serde_json::Value::as_str)
            && let Ok(target) = EntryId::new(target)
        {
            edges.push(target);
        }
        edges
    }

    /// Parse a config candidate, returning `None` if it fails
    /// [`candidate_is_valid`] or does not deserialize.
    #[must_use]
    pub fn from_candidate(candidate: serde_json::Value) -> Option<Self> {
        if !candidate_is_valid(&candidate) {
            return None;
        }
        serde_json::from_value(candidate).ok()
    }
}

impl PartialEq for EntryConfig {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.type_tag == other.type_tag
            && self.payload == other.payload
            && match (&self.script, &other.script) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Debug for EntryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryConfig")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("payload", &self.payload)
            .field("has_script", &self.script.is_some())
            .finish()
    }
}

/// Whether a raw JSON value is a structurally valid config: a non-null
/// object whose `@type` is a word and whose `@id` is a well-formed ID.
#[must_use]
pub fn candidate_is_valid(candidate: &serde_json::Value) -> bool {
    let Some(object) = candidate.as_object() else {
        return false;
    };
    let type_ok = object
        .get(TYPE_KEY)
        .and_then(serde_json::Value::as_str)
        .is_some_and(TypeTag::is_valid);
    let id_ok = object
        .get(ID_KEY)
        .and_then(serde_json::Value::as_str)
        .is_some_and(id::is_valid);
    type_ok && id_ok
}

/// The `config.json` response document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// The library context tag.
    #[serde(rename = "@context")]
    pub context: Option<String>,
    /// Configs in request order; `None` for unknown IDs.
    #[serde(rename = "@graph", default)]
    pub graph: Vec<Option<serde_json::Value>>,
}

impl ConfigDocument {
    /// Build a response document from resolved configs.
    #[must_use]
    pub fn new(context: &str, configs: Vec<Option<EntryConfig>>) -> Self {
        let graph = configs
            .into_iter()
            .map(|c| c.and_then(|c| serde_json::to_value(c).ok()))
            .collect();
        Self {
            context: Some(context.to_owned()),
            graph,
        }
    }

    /// Check the context tag and return the valid configs it carries.
    /// `null` and invalid members are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidContext`] if the document's context
    /// does not equal `expected`.
    pub fn into_configs(self, expected: &str) -> RegistryResult<Vec<EntryConfig>> {
        if self.context.as_deref() != Some(expected) {
            return Err(RegistryError::InvalidContext {
                expected: expected.to_owned(),
                found: self.context,
            });
        }
        Ok(self
            .graph
            .into_iter()
            .flatten()
            .filter_map(EntryConfig::from_candidate)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_json_shape() {
        let config = EntryConfig::module("lib.core.is", "/lib/is.json", &["lib.core.base"]).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({
                "@id": "lib.core.is",
                "@type": "Module",
                "path": "/lib/is.json",
                "requires": ["lib.core.base"],
            })
        );
    }

    #[test]
    fn test_config_deserialize_keeps_payload() {
        let config: EntryConfig = serde_json::from_value(json!({
            "@id": "lib.alias",
            "@type": "Alias",
            "target": "lib.core",
            "note": "extra",
        }))
        .unwrap();
        assert_eq!(config.type_tag.as_str(), "Alias");
        assert_eq!(config.target(), Some(&json!("lib.core")));
        assert_eq!(config.payload.get("note"), Some(&json!("extra")));
    }

    #[test]
    fn test_candidate_validation() {
        assert!(candidate_is_valid(&json!({"@id": "lib.a", "@type": "Package"})));
        assert!(!candidate_is_valid(&json!(null)));
        assert!(!candidate_is_valid(&json!([1, 2])));
        assert!(!candidate_is_valid(&json!({"@id": "lib.a"})));
        assert!(!candidate_is_valid(&json!({"@id": "lib a", "@type": "Package"})));
        assert!(!candidate_is_valid(&json!({"@id": "lib.a", "@type": "Pack-age"})));
        assert!(!candidate_is_valid(&json!({"@id": 4, "@type": "Package"})));
    }

    #[test]
    fn test_edges() {
        let module = EntryConfig::module("lib.m", "m.json", &["lib.a", "lib.b"]).unwrap();
        let ids: Vec<_> = module.edges().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["lib.a", "lib.b"]);

        let alias = EntryConfig::alias("lib.x", "lib.m").unwrap();
        assert_eq!(alias.edges()[0].as_str(), "lib.m");
    }

    #[test]
    fn test_document_context_mismatch() {
        let doc = ConfigDocument {
            context: Some("Other".into()),
            graph: vec![],
        };
        assert!(matches!(
            doc.into_configs("Library"),
            Err(RegistryError::InvalidContext { .. })
        ));
    }

    #[test]
    fn test_document_skips_nulls_and_invalid() {
        let doc: ConfigDocument = serde_json::from_value(json!({
            "@context": "Library",
            "@graph": [
                {"@id": "lib", "@type": "Package"},
                null,
                {"@id": "not valid", "@type": "Package"},
            ]
        }))
        .unwrap();
        let configs = doc.into_configs("Library").unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id.as_str(), "lib");
    }
}
