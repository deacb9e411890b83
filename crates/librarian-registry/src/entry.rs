//! Runtime entries and their constructors.
//!
//! An [`Entry`] is built from exactly one [`EntryConfig`] by the constructor
//! registered for the config's type tag. The variant set is closed
//! ([`EntryKind`]); the type table only decides which constructor handles
//! which tag.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::config::{EntryConfig, VALUE_KEY};
use crate::error::{RegistryError, RegistryResult};
use crate::exports::{Exports, Namespace, ScriptFn};
use crate::id::{EntryId, TypeTag};
use crate::loader::{self, LoadCell, LoadOutcome, LoadState};
use crate::registry::Registry;

/// Builds an entry variant from a config. Registered per type tag.
pub type EntryConstructor = fn(&EntryConfig) -> RegistryResult<EntryKind>;

/// A runtime entry.
pub struct Entry {
    id: EntryId,
    type_tag: TypeTag,
    kind: EntryKind,
}

/// The closed set of entry variants.
pub enum EntryKind {
    /// Aggregates its children's exports.
    Package(Package),
    /// Loads an external unit after its dependencies.
    Module(Module),
    /// Forwards to another entry's exports.
    Alias(Alias),
    /// Exposes an embedded callable.
    Script(Script),
    /// Exposes an embedded raw value.
    Value(ValueEntry),
}

/// A pure aggregation node. Always loaded.
pub struct Package {
    namespace: Namespace,
}

impl Package {
    /// The package's export view.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Attach `child` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if another child holds `key`.
    pub fn add(&self, key: &str, child: &Arc<Entry>) -> RegistryResult<()> {
        self.namespace.add(key, child)
    }
}

/// An external unit at `path`, loaded after every ID in `requires`.
pub struct Module {
    path: String,
    requires: Vec<EntryId>,
    pub(crate) cell: LoadCell,
}

impl Module {
    /// The unit location (resolved file path or relative URL).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// IDs that must be loaded first.
    #[must_use]
    pub fn requires(&self) -> &[EntryId] {
        &self.requires
    }
}

/// Forwards to `target`.
pub struct Alias {
    target: EntryId,
    pub(crate) cell: LoadCell,
}

impl Alias {
    /// The forwarded ID.
    #[must_use]
    pub fn target(&self) -> &EntryId {
        &self.target
    }
}

/// An embedded callable.
pub struct Script {
    function: ScriptFn,
}

impl Script {
    /// The callable.
    #[must_use]
    pub fn function(&self) -> &ScriptFn {
        &self.function
    }
}

/// An embedded raw value.
pub struct ValueEntry {
    value: serde_json::Value,
}

impl ValueEntry {
    /// The value.
    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl Entry {
    pub(crate) fn new(config: &EntryConfig, kind: EntryKind) -> Self {
        Self {
            id: config.id.clone(),
            type_tag: config.type_tag.clone(),
            kind,
        }
    }

    /// The entry's ID.
    #[must_use]
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    /// The config type tag this entry was built from.
    #[must_use]
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// The entry variant.
    #[must_use]
    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// The variant name (`Package`, `Module`, ...), independent of the tag
    /// the entry was registered under.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EntryKind::Package(_) => TypeTag::PACKAGE,
            EntryKind::Module(_) => TypeTag::MODULE,
            EntryKind::Alias(_) => TypeTag::ALIAS,
            EntryKind::Script(_) => TypeTag::SCRIPT,
            EntryKind::Value(_) => TypeTag::CONFIG,
        }
    }

    /// The package variant, if this entry is one.
    #[must_use]
    pub fn as_package(&self) -> Option<&Package> {
        match &self.kind {
            EntryKind::Package(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the entry is loaded at construction (no load action).
    #[must_use]
    pub fn is_eager(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::Package(_) | EntryKind::Script(_) | EntryKind::Value(_)
        )
    }

    /// Current load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        match &self.kind {
            EntryKind::Module(m) => m.cell.state(),
            EntryKind::Alias(a) => a.cell.state(),
            _ => LoadState::Loaded,
        }
    }

    /// Whether the entry has reached the loaded state.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// The entry's exports, or `None` while unloaded.
    #[must_use]
    pub fn exports(&self) -> Option<Exports> {
        match &self.kind {
            EntryKind::Package(p) => Some(Exports::Namespace(p.namespace.clone())),
            EntryKind::Script(s) => Some(Exports::Script(s.function.clone())),
            EntryKind::Value(v) => Some(Exports::Value(v.value.clone())),
            EntryKind::Module(m) => m.cell.exports(),
            EntryKind::Alias(a) => a.cell.exports(),
        }
    }

    /// Load the entry and return its exports.
    ///
    /// Idempotent once loaded. Concurrent calls share one in-flight
    /// operation. An alias whose target cannot be resolved yields `Ok(None)`
    /// and stays unloaded.
    pub fn load(self: &Arc<Self>, registry: &Registry) -> BoxFuture<'static, LoadOutcome> {
        let entry = Arc::clone(self);
        let registry = registry.clone();
        async move {
            match &entry.kind {
                EntryKind::Module(module) => {
                    module
                        .cell
                        .run(|| loader::module_operation(Arc::clone(&entry), registry.clone()))
                        .await
                },
                EntryKind::Alias(alias) => {
                    alias
                        .cell
                        .run(|| loader::alias_operation(Arc::clone(&entry), registry.clone()))
                        .await
                },
                _ => Ok(entry.exports()),
            }
        }
        .boxed()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn invalid(config: &EntryConfig, message: &str) -> RegistryError {
    RegistryError::InvalidConfig {
        id: config.id.to_string(),
        message: message.to_owned(),
    }
}

/// Constructor for `Package` configs.
///
/// # Errors
///
/// Never fails; the signature matches [`EntryConstructor`].
pub fn build_package(config: &EntryConfig) -> RegistryResult<EntryKind> {
    Ok(EntryKind::Package(Package {
        namespace: Namespace::new(config.id.as_str()),
    }))
}

/// Constructor for `Module` configs.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidConfig`] if `path` is not a string or
/// `requires` is not an array of well-formed IDs.
pub fn build_module(config: &EntryConfig) -> RegistryResult<EntryKind> {
    let path = config
        .path()
        .ok_or_else(|| invalid(config, "invalid config.path"))?
        .to_owned();

    let requires = match config.requires() {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .and_then(|s| EntryId::new(s).ok())
                    .ok_or_else(|| invalid(config, "invalid config.requires"))
            })
            .collect::<RegistryResult<Vec<_>>>()?,
        Some(_) => return Err(invalid(config, "invalid config.requires")),
    };

    Ok(EntryKind::Module(Module {
        path,
        requires,
        cell: LoadCell::new(),
    }))
}

/// Constructor for `Alias` configs.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidTarget`] if `target` is missing, not a
/// well-formed ID, or points at the alias itself.
pub fn build_alias(config: &EntryConfig) -> RegistryResult<EntryKind> {
    let invalid_target = || RegistryError::InvalidTarget {
        id: config.id.to_string(),
        target: config
            .target()
            .map_or_else(|| "<missing>".to_owned(), ToString::to_string),
    };

    let target = config
        .target()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| EntryId::new(s).ok())
        .ok_or_else(invalid_target)?;
    if target == config.id {
        return Err(invalid_target());
    }

    Ok(EntryKind::Alias(Alias {
        target,
        cell: LoadCell::new(),
    }))
}

/// Constructor for `Script` configs.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidConfig`] if the config carries no
/// callable (JSON-sourced scripts never do).
pub fn build_script(config: &EntryConfig) -> RegistryResult<EntryKind> {
    let function = config
        .script
        .clone()
        .ok_or_else(|| invalid(config, "invalid Script: value is not callable"))?;
    Ok(EntryKind::Script(Script { function }))
}

/// Constructor for raw `Config` values. A missing `@value` is `null`.
///
/// # Errors
///
/// Never fails; the signature matches [`EntryConstructor`].
pub fn build_value(config: &EntryConfig) -> RegistryResult<EntryKind> {
    Ok(EntryKind::Value(ValueEntry {
        value: config
            .payload
            .get(VALUE_KEY)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    }))
}

/// The built-in type table.
#[must_use]
pub fn builtin_types() -> Vec<(&'static str, EntryConstructor)> {
    vec![
        (TypeTag::PACKAGE, build_package as EntryConstructor),
        (TypeTag::ALIAS, build_alias as EntryConstructor),
        (TypeTag::MODULE, build_module as EntryConstructor),
        (TypeTag::SCRIPT, build_script as EntryConstructor),
        (TypeTag::CONFIG, build_value as EntryConstructor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> EntryConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_module_requires_path() {
        let cfg = config(json!({"@id": "lib.m", "@type": "Module"}));
        assert!(matches!(
            build_module(&cfg),
            Err(RegistryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_module_rejects_bad_requires() {
        let cfg = config(json!({
            "@id": "lib.m", "@type": "Module", "path": "m.json", "requires": ["lib.ok", "not ok"]
        }));
        assert!(build_module(&cfg).is_err());

        let cfg = config(json!({
            "@id": "lib.m", "@type": "Module", "path": "m.json", "requires": "lib.ok"
        }));
        assert!(build_module(&cfg).is_err());
    }

    #[test]
    fn test_module_parses_requires() {
        let cfg = EntryConfig::module("lib.m", "m.json", &["lib.a", "lib.b:0.1.0"]).unwrap();
        let EntryKind::Module(module) = build_module(&cfg).unwrap() else {
            panic!("expected module");
        };
        assert_eq!(module.path(), "m.json");
        assert_eq!(module.requires().len(), 2);
        assert_eq!(module.cell.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_alias_rejects_invalid_target() {
        let cfg = config(json!({"@id": "lib.x", "@type": "Alias", "target": "no good"}));
        assert!(matches!(
            build_alias(&cfg),
            Err(RegistryError::InvalidTarget { .. })
        ));

        let cfg = config(json!({"@id": "lib.x", "@type": "Alias"}));
        assert!(matches!(
            build_alias(&cfg),
            Err(RegistryError::InvalidTarget { .. })
        ));

        let cfg = EntryConfig::alias("lib.x", "lib.x").unwrap();
        assert!(matches!(
            build_alias(&cfg),
            Err(RegistryError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_script_requires_callable() {
        let cfg = config(json!({"@id": "lib.s", "@type": "Script", "@value": "function() {}"}));
        assert!(matches!(
            build_script(&cfg),
            Err(RegistryError::InvalidConfig { .. })
        ));

        let script = ScriptFn::new(|_| async { Ok(None) }.boxed());
        let cfg = EntryConfig::script("lib.s", script).unwrap();
        assert!(matches!(build_script(&cfg), Ok(EntryKind::Script(_))));
    }

    #[test]
    fn test_value_entry_is_eager() {
        let cfg = EntryConfig::value("lib.settings", json!({"debug": true})).unwrap();
        let entry = Entry::new(&cfg, build_value(&cfg).unwrap());
        assert!(entry.is_loaded());
        assert!(entry.is_eager());
        assert_eq!(
            entry.exports().unwrap().as_value(),
            Some(&json!({"debug": true}))
        );
    }

    #[test]
    fn test_package_starts_empty_and_loaded() {
        let cfg = EntryConfig::package("lib").unwrap();
        let entry = Entry::new(&cfg, build_package(&cfg).unwrap());
        assert!(entry.is_loaded());
        let exports = entry.exports().unwrap();
        assert!(exports.as_namespace().unwrap().is_empty());
    }
}
