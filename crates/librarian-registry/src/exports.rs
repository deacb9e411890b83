//! Exported values and the package namespace view.
//!
//! A package's exports are a [`Namespace`]: one member per integrated child.
//! Children that are already loaded when they are attached (packages,
//! scripts, raw values) are stored as a snapshot. Modules and aliases may
//! still be unloaded, so the namespace keeps a reference to the child entry
//! and reads its current exports every time the key is accessed.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use tracing::warn;

use crate::entry::Entry;
use crate::error::{RegistryError, RegistryResult};
use crate::id;

/// The value an entry exposes once it is loaded.
#[derive(Clone)]
pub enum Exports {
    /// Plain data (JSON documents, raw config values, unit text).
    Value(serde_json::Value),
    /// A package's live export view.
    Namespace(Namespace),
    /// An embedded callable.
    Script(ScriptFn),
    /// Results of a batch call, in request order.
    List(Vec<Option<Exports>>),
    /// An opaque host value produced by a unit loader.
    Native(Arc<dyn Any + Send + Sync>),
}

impl Exports {
    /// Wrap a host value.
    pub fn native<T: Any + Send + Sync>(value: T) -> Self {
        Self::Native(Arc::new(value))
    }

    /// The JSON value, if this is plain data.
    #[must_use]
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The namespace, if this is a package export view.
    #[must_use]
    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Self::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    /// The callable, if this is a script.
    #[must_use]
    pub fn as_script(&self) -> Option<&ScriptFn> {
        match self {
            Self::Script(f) => Some(f),
            _ => None,
        }
    }

    /// The batch results, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Option<Exports>]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Downcast a native host value.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Native(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Identity comparison.
    ///
    /// Shared handles (namespaces, scripts, native values) compare by
    /// pointer; data compares by value.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Self::Value(x), Self::Value(y)) => x == y,
            (Self::Namespace(x), Self::Namespace(y)) => x.ptr_eq(y),
            (Self::Script(x), Self::Script(y)) => x.ptr_eq(y),
            (Self::Native(x), Self::Native(y)) => Arc::ptr_eq(x, y),
            (Self::List(x), Self::List(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y).all(|pair| match pair {
                        (Some(l), Some(r)) => Self::same(l, r),
                        (None, None) => true,
                        _ => false,
                    })
            },
            _ => false,
        }
    }

    /// Render the exports as JSON for display. Callables and host values
    /// become descriptive strings; unloaded namespace members become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Namespace(ns) => {
                let map = ns
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let value = ns
                            .get(&key)
                            .map_or(serde_json::Value::Null, |e| e.to_json());
                        (key, value)
                    })
                    .collect();
                serde_json::Value::Object(map)
            },
            Self::Script(_) => serde_json::Value::String("[script]".to_owned()),
            Self::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map_or(serde_json::Value::Null, Self::to_json))
                    .collect(),
            ),
            Self::Native(_) => serde_json::Value::String("[native]".to_owned()),
        }
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Namespace(ns) => f.debug_tuple("Namespace").field(&ns.keys()).finish(),
            Self::Script(_) => f.write_str("Script(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

impl From<serde_json::Value> for Exports {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

type ScriptBody =
    dyn Fn(Vec<serde_json::Value>) -> BoxFuture<'static, RegistryResult<Option<Exports>>>
        + Send
        + Sync;

/// An embedded callable carried by a `Script` config.
#[derive(Clone)]
pub struct ScriptFn(Arc<ScriptBody>);

impl ScriptFn {
    /// Wrap an async function body.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> BoxFuture<'static, RegistryResult<Option<Exports>>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(body))
    }

    /// Invoke the callable.
    ///
    /// # Errors
    ///
    /// Propagates whatever the script body returns.
    pub async fn call(&self, args: Vec<serde_json::Value>) -> RegistryResult<Option<Exports>> {
        (self.0)(args).await
    }

    /// Whether both handles wrap the same callable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptFn(..)")
    }
}

/// One key of a package namespace.
#[derive(Clone)]
enum Member {
    /// Exports copied when the child was attached.
    Snapshot { child: Arc<Entry>, exports: Exports },
    /// Read through to the child's current exports.
    Live(Arc<Entry>),
}

impl Member {
    fn child(&self) -> &Arc<Entry> {
        match self {
            Self::Snapshot { child, .. } | Self::Live(child) => child,
        }
    }

    fn resolve(&self) -> Option<Exports> {
        match self {
            Self::Snapshot { exports, .. } => Some(exports.clone()),
            Self::Live(child) => child.exports(),
        }
    }
}

/// A package's export view.
///
/// Cloning yields another handle to the same members.
#[derive(Clone)]
pub struct Namespace {
    package: Arc<str>,
    members: Arc<RwLock<BTreeMap<String, Member>>>,
}

impl Namespace {
    pub(crate) fn new(package: &str) -> Self {
        Self {
            package: Arc::from(package),
            members: Arc::default(),
        }
    }

    /// Attach `child` under `key`.
    ///
    /// Re-adding the same child under the same key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if a different child already
    /// holds `key`, or [`RegistryError::InvalidArguments`] if `key` is not a
    /// single identifier segment.
    pub(crate) fn add(&self, key: &str, child: &Arc<Entry>) -> RegistryResult<()> {
        if !id::is_valid_segment(key) {
            return Err(RegistryError::InvalidArguments(format!(
                "namespace key must be a single segment, got: {key}"
            )));
        }

        let mut members = self.members.write().unwrap_or_else(|e| {
            warn!("Namespace lock poisoned, recovering");
            PoisonError::into_inner(e)
        });

        if let Some(existing) = members.get(key) {
            if Arc::ptr_eq(existing.child(), child) {
                return Ok(());
            }
            return Err(RegistryError::DuplicateKey {
                package: self.package.to_string(),
                key: key.to_owned(),
            });
        }

        let member = if child.is_eager() {
            match child.exports() {
                Some(exports) => Member::Snapshot {
                    child: Arc::clone(child),
                    exports,
                },
                None => Member::Live(Arc::clone(child)),
            }
        } else {
            Member::Live(Arc::clone(child))
        };
        members.insert(key.to_owned(), member);
        Ok(())
    }

    /// The exports under `key`.
    ///
    /// Returns `None` if the key is absent or its entry is not loaded yet.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Exports> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.get(key).and_then(Member::resolve)
    }

    /// The entry attached under `key`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<Arc<Entry>> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.get(key).map(|m| Arc::clone(m.child()))
    }

    /// Whether `key` is attached (loaded or not).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.contains_key(key)
    }

    /// Walk a relative dotted path (`a.b`) through nested namespaces.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Exports> {
        let mut current = Exports::Namespace(self.clone());
        for segment in id::split(path) {
            current = current.as_namespace()?.get(segment)?;
        }
        Some(current)
    }

    /// Attached keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.keys().cloned().collect()
    }

    /// Number of attached members.
    #[must_use]
    pub fn len(&self) -> usize {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.len()
    }

    /// Whether no members are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ID of the package that owns this view.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Whether both handles view the same package.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.members, &other.members)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("package", &self.package)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::EntryConfig;
    use crate::registry::{Registry, RegistrySettings};

    fn registry() -> Registry {
        let reg = Registry::new(RegistrySettings::default())
            .with_builtin_types()
            .unwrap();
        reg.add_config([
            EntryConfig::package("lib").unwrap(),
            EntryConfig::package("lib.a").unwrap(),
            EntryConfig::value("lib.b", json!("bee")).unwrap(),
            EntryConfig::module("lib.m", "m.json", &[]).unwrap(),
        ])
        .unwrap();
        reg
    }

    fn entry(reg: &Registry, id: &str) -> Arc<Entry> {
        reg.get_entry(id).unwrap().unwrap()
    }

    #[test]
    fn test_add_same_child_is_noop() {
        let reg = registry();
        let root = entry(&reg, "lib");
        let a = entry(&reg, "lib.a");
        let package = root.as_package().unwrap();
        assert_eq!(package.namespace().len(), 1);

        package.add("a", &a).unwrap();
        package.add("a", &a).unwrap();
        assert_eq!(package.namespace().keys(), vec!["a"]);
        assert!(Arc::ptr_eq(&package.namespace().entry("a").unwrap(), &a));
    }

    #[test]
    fn test_add_other_child_under_used_key() {
        let reg = registry();
        let root = entry(&reg, "lib");
        let a = entry(&reg, "lib.a");
        let b = entry(&reg, "lib.b");
        let package = root.as_package().unwrap();

        let err = package.add("a", &b).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateKey {
                package: "lib".into(),
                key: "a".into(),
            }
        );
        assert!(Arc::ptr_eq(&package.namespace().entry("a").unwrap(), &a));
        assert_eq!(package.namespace().keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_add_rejects_invalid_key() {
        let reg = registry();
        let root = entry(&reg, "lib");
        let b = entry(&reg, "lib.b");
        let package = root.as_package().unwrap();

        for key in ["a.b", "1b", ""] {
            assert!(matches!(
                package.add(key, &b),
                Err(RegistryError::InvalidArguments(_))
            ));
        }
        assert_eq!(package.namespace().len(), 1);
    }

    #[test]
    fn test_snapshot_and_live_members() {
        let reg = registry();
        let root = entry(&reg, "lib");
        entry(&reg, "lib.a");
        entry(&reg, "lib.b");
        let m = entry(&reg, "lib.m");
        let ns = root.as_package().unwrap().namespace();

        assert_eq!(ns.get("b").unwrap().as_value(), Some(&json!("bee")));
        assert!(!m.is_loaded());
        assert!(ns.contains("m"));
        assert!(ns.get("m").is_none());
        assert!(Exports::same(
            &ns.lookup("a").unwrap(),
            &ns.get("a").unwrap()
        ));
    }
}
