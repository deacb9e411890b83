//! A ready-to-use library: a registry bootstrapped with its root package and
//! the `get`/`load` entry points.
//!
//! ```text
//! lib            Package (the root namespace)
//! lib.get        Script  id -> exports, never loads
//! lib.load       Script  ids... -> [exports], waits for the catalog
//! ```
//!
//! The catalog (a directory scan or the remote `available` list) is
//! discovered by a shared future that starts on the first `load` or
//! [`Library::ready`] call. Every later caller observes the same outcome.

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use tracing::{debug, info};

use crate::config::EntryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::exports::{Exports, Namespace, ScriptFn};
use crate::loader::{FileUnitLoader, UnitLoader};
use crate::registry::{
    DEFAULT_CONTEXT, DEFAULT_ROOT_KEY, Registry, RegistrySettings, WeakRegistry,
};
use crate::source::{DirectoryScanner, RemoteCatalog, ScanOptions};

type Readiness = Shared<BoxFuture<'static, RegistryResult<()>>>;

/// Where the library's catalog comes from.
#[derive(Clone)]
pub enum Discovery {
    /// No discovery; configs are added by hand.
    Manual,
    /// Scan a local directory tree.
    Local {
        /// Scan root.
        directory: PathBuf,
        /// Maximum subdirectory depth.
        depth: i32,
        /// Scanner to use.
        scanner: DirectoryScanner,
    },
    /// Fetch the available IDs, and configs on demand, from a remote catalog.
    Remote(Arc<dyn RemoteCatalog>),
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => f.write_str("Manual"),
            Self::Local {
                directory, depth, ..
            } => f
                .debug_struct("Local")
                .field("directory", directory)
                .field("depth", depth)
                .finish_non_exhaustive(),
            Self::Remote(_) => f.write_str("Remote(..)"),
        }
    }
}

/// Options for [`Library::new`].
#[derive(Clone)]
pub struct LibraryOptions {
    /// Root package key; every ID must start with it.
    pub root_key: String,
    /// Expected `@context` tag.
    pub context: String,
    /// Executes module units.
    pub unit_loader: Arc<dyn UnitLoader>,
    /// Catalog source.
    pub discovery: Discovery,
}

impl LibraryOptions {
    /// A local library rooted at `directory`, scanned to `depth` levels.
    ///
    /// The scanner filters on the default context. Change it with
    /// [`LibraryOptions::with_context`], which keeps both in step, rather than
    /// by assigning `context` directly.
    #[must_use]
    pub fn local(directory: impl Into<PathBuf>, depth: i32) -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_owned(),
            context: DEFAULT_CONTEXT.to_owned(),
            unit_loader: Arc::new(FileUnitLoader),
            discovery: Discovery::Local {
                directory: directory.into(),
                depth,
                scanner: DirectoryScanner::local(ScanOptions::new(DEFAULT_CONTEXT)),
            },
        }
    }

    /// Expect `context` in fetched documents and, for local discovery, in
    /// scanned ones.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        if let Discovery::Local { scanner, .. } = &mut self.discovery {
            let mut options = scanner.options().clone();
            options.context.clone_from(&context);
            *scanner = scanner.clone().with_options(options);
        }
        self.context = context;
        self
    }
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_owned(),
            context: DEFAULT_CONTEXT.to_owned(),
            unit_loader: Arc::new(FileUnitLoader),
            discovery: Discovery::Manual,
        }
    }
}

impl std::fmt::Debug for LibraryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryOptions")
            .field("root_key", &self.root_key)
            .field("context", &self.context)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

/// A bootstrapped library.
#[derive(Clone)]
pub struct Library {
    registry: Registry,
    root: Namespace,
    ready: Readiness,
}

impl Library {
    /// Build the registry and bootstrap the root entries.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidId`] if `root_key` is not a single
    /// identifier segment, or any error from registering the bootstrap
    /// configs.
    pub fn new(options: LibraryOptions) -> RegistryResult<Self> {
        let LibraryOptions {
            root_key,
            context,
            unit_loader,
            discovery,
        } = options;
        if !crate::id::is_valid_segment(&root_key) || root_key.contains(':') {
            return Err(RegistryError::InvalidId(root_key));
        }

        let settings = RegistrySettings {
            root_key: Some(root_key.clone()),
            context,
        };
        let registry = match &discovery {
            Discovery::Remote(catalog) => {
                Registry::remote(settings, unit_loader, Arc::clone(catalog))
            },
            Discovery::Manual | Discovery::Local { .. } => {
                Registry::with_unit_loader(settings, unit_loader)
            },
        }
        .with_builtin_types()?;

        let ready = readiness(registry.downgrade(), discovery);
        let get_id = format!("{root_key}.get");
        let load_id = format!("{root_key}.load");
        registry.add_config([
            EntryConfig::package(&root_key)?,
            EntryConfig::script(&get_id, get_script(registry.downgrade()))?,
            EntryConfig::script(&load_id, load_script(registry.downgrade(), ready.clone()))?,
        ])?;
        registry.make_entries(&[root_key.as_str(), get_id.as_str(), load_id.as_str()])?;

        let root = registry
            .get_entry(&root_key)?
            .and_then(|entry| entry.exports())
            .and_then(|exports| exports.as_namespace().cloned())
            .ok_or_else(|| RegistryError::NotFound(root_key.clone()))?;

        debug!(root_key = %root_key, "Library bootstrapped");
        Ok(Self {
            registry,
            root,
            ready,
        })
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The root namespace.
    #[must_use]
    pub fn root(&self) -> &Namespace {
        &self.root
    }

    /// Wait until the initial catalog discovery has finished.
    ///
    /// # Errors
    ///
    /// Returns the discovery error, to every caller.
    pub async fn ready(&self) -> RegistryResult<()> {
        self.ready.clone().await
    }

    /// The exports of `id` if it is already constructed and loaded.
    ///
    /// Never loads and never fails.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Exports> {
        lookup(&self.registry, id)
    }

    /// Resolve and load `ids`, returning their exports in request order.
    ///
    /// `None` marks IDs that are unknown or did not reach the loaded state
    /// (such as an alias whose target is not resolvable yet).
    ///
    /// # Errors
    ///
    /// Returns discovery errors and structural or load failures.
    pub async fn load(&self, ids: &[&str]) -> RegistryResult<Vec<Option<Exports>>> {
        let ids: Vec<String> = ids.iter().map(|&id| id.to_owned()).collect();
        load_all(self.registry.clone(), self.ready.clone(), ids).await
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("registry", &self.registry)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn gone() -> RegistryError {
    RegistryError::Unsupported("library registry has been dropped".to_owned())
}

fn readiness(registry: WeakRegistry, discovery: Discovery) -> Readiness {
    async move {
        let registry = registry.upgrade().ok_or_else(gone)?;
        let count = match discovery {
            Discovery::Manual => 0,
            Discovery::Local {
                directory,
                depth,
                scanner,
            } => registry.load_available(&scanner, &directory, depth).await?,
            Discovery::Remote(_) => registry.load_remote_available().await?,
        };
        info!(
            count,
            available = registry.available().len(),
            "Initial loading of library is finished"
        );
        Ok(())
    }
    .boxed()
    .shared()
}

fn lookup(registry: &Registry, id: &str) -> Option<Exports> {
    registry
        .get_entry(id)
        .ok()
        .flatten()
        .filter(|entry| entry.is_loaded())
        .and_then(|entry| entry.exports())
}

async fn load_all(
    registry: Registry,
    ready: Readiness,
    ids: Vec<String>,
) -> RegistryResult<Vec<Option<Exports>>> {
    ready.await?;
    let entries = try_join_all(ids.iter().map(|id| registry.load_entry(id))).await?;
    try_join_all(
        entries
            .iter()
            .flatten()
            .filter(|entry| !entry.is_loaded())
            .map(|entry| entry.load(&registry)),
    )
    .await?;
    Ok(entries
        .iter()
        .map(|entry| entry.as_ref().and_then(|e| e.exports()))
        .collect())
}

fn id_args(args: &[serde_json::Value]) -> RegistryResult<Vec<String>> {
    args.iter()
        .map(|arg| {
            arg.as_str().map(str::to_owned).ok_or_else(|| {
                RegistryError::InvalidArguments(format!("expected an id string, got {arg}"))
            })
        })
        .collect()
}

/// `get(id)`: the loaded exports of `id`, or `None`.
fn get_script(registry: WeakRegistry) -> ScriptFn {
    ScriptFn::new(move |args| {
        let registry = registry.upgrade();
        async move {
            let registry = registry.ok_or_else(gone)?;
            let id = id_args(&args)?
                .into_iter()
                .next()
                .ok_or_else(|| RegistryError::InvalidArguments("get expects an id".to_owned()))?;
            Ok(lookup(&registry, &id))
        }
        .boxed()
    })
}

/// `load(ids...)`: the exports of every ID, in order, after loading.
fn load_script(registry: WeakRegistry, ready: Readiness) -> ScriptFn {
    ScriptFn::new(move |args| {
        let registry = registry.upgrade();
        let ready = ready.clone();
        async move {
            let registry = registry.ok_or_else(gone)?;
            let ids = id_args(&args)?;
            let exports = load_all(registry, ready, ids).await?;
            Ok(Some(Exports::List(exports)))
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_context_updates_scanner() {
        let options = LibraryOptions::local("/catalog", 2).with_context("Other");
        assert_eq!(options.context, "Other");
        let Discovery::Local { scanner, depth, .. } = &options.discovery else {
            panic!("expected local discovery");
        };
        assert_eq!(scanner.options().context, "Other");
        assert_eq!(*depth, 2);

        let manual = LibraryOptions::default().with_context("Other");
        assert_eq!(manual.context, "Other");
        assert!(matches!(manual.discovery, Discovery::Manual));
    }

    #[tokio::test]
    async fn test_bootstrap_entries() {
        let library = Library::new(LibraryOptions::default()).unwrap();
        assert!(library.root().contains("get"));
        assert!(library.root().contains("load"));
        assert!(library.get("lib").is_some());
        assert!(library.get("lib.nothing").is_none());

        let get = library.get("lib.get").unwrap();
        let found = get
            .as_script()
            .unwrap()
            .call(vec![json!("lib.load")])
            .await
            .unwrap();
        assert!(found.unwrap().as_script().is_some());
    }

    #[tokio::test]
    async fn test_load_script_returns_list() {
        let library = Library::new(LibraryOptions::default()).unwrap();
        library
            .registry()
            .add_config([EntryConfig::value("lib.answer", json!(42)).unwrap()])
            .unwrap();

        let load = library.root().get("load").unwrap();
        let result = load
            .as_script()
            .unwrap()
            .call(vec![json!("lib.answer"), json!("lib.unknown")])
            .await
            .unwrap()
            .unwrap();
        let items = result.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_value(), Some(&json!(42)));
        assert!(items[1].is_none());
        assert!(library.root().contains("answer"));
    }

    #[test]
    fn test_rejects_bad_root_key() {
        let options = LibraryOptions {
            root_key: "lib.core".to_owned(),
            ..LibraryOptions::default()
        };
        assert!(matches!(
            Library::new(options),
            Err(RegistryError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_script_arguments_validated() {
        let library = Library::new(LibraryOptions::default()).unwrap();
        let get = library.get("lib.get").unwrap();
        let err = get.as_script().unwrap().call(vec![json!(3)]).await;
        assert!(matches!(err, Err(RegistryError::InvalidArguments(_))));
    }
}
