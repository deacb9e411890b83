//! The registry: available IDs, resident configs, constructed entries and the
//! type table.
//!
//! Three facts are tracked per ID and kept consistent:
//! `available ⊇ configs.keys()` and `entries.keys() ⊆ available`.
//!
//! [`Registry`] is a cheap handle; clones share the same state. No lock is
//! held across an `.await`. When both are needed, the state lock is taken
//! before any package namespace lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};

use crate::config::{ConfigDocument, EntryConfig};
use crate::entry::{self, Entry, EntryConstructor};
use crate::error::{RegistryError, RegistryResult};
use crate::id::{self, EntryId, TypeTag};
use crate::integrate::integrate;
use crate::loader::{FileUnitLoader, UnitLoader};
use crate::source::{DirectoryScanner, RemoteCatalog, scan_catalog};

/// Default root key of a library.
pub const DEFAULT_ROOT_KEY: &str = "lib";
/// Default context tag of a local library.
pub const DEFAULT_CONTEXT: &str = "Library";
/// Default context tag of a remotely served library.
pub const DEFAULT_REMOTE_CONTEXT: &str = "Web-Library";

/// Plain registry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// When set, only configs whose first segment equals this key are
    /// admitted.
    pub root_key: Option<String>,
    /// The expected `@context` tag of fetched documents.
    pub context: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            root_key: Some(DEFAULT_ROOT_KEY.to_owned()),
            context: DEFAULT_CONTEXT.to_owned(),
        }
    }
}

type ConfigLoad = Shared<BoxFuture<'static, RegistryResult<Option<EntryConfig>>>>;

#[derive(Default)]
struct State {
    available: BTreeSet<EntryId>,
    configs: HashMap<EntryId, EntryConfig>,
    entries: HashMap<EntryId, Arc<Entry>>,
    types: HashMap<String, EntryConstructor>,
}

struct RegistryInner {
    settings: RegistrySettings,
    state: RwLock<State>,
    unit_loader: Arc<dyn UnitLoader>,
    remote: Option<Arc<dyn RemoteCatalog>>,
    config_loads: Mutex<HashMap<EntryId, ConfigLoad>>,
}

/// Handle to a registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

/// A non-owning registry handle, for callables stored inside the registry.
#[derive(Clone)]
pub struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    /// The registry, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

impl std::fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakRegistry(..)")
    }
}

impl Registry {
    /// A local registry that loads units from the file system.
    #[must_use]
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_unit_loader(settings, Arc::new(FileUnitLoader))
    }

    /// A local registry with a custom unit loader.
    #[must_use]
    pub fn with_unit_loader(settings: RegistrySettings, unit_loader: Arc<dyn UnitLoader>) -> Self {
        Self::build(settings, unit_loader, None)
    }

    /// A registry that fetches configs from `catalog` on demand.
    #[must_use]
    pub fn remote(
        settings: RegistrySettings,
        unit_loader: Arc<dyn UnitLoader>,
        catalog: Arc<dyn RemoteCatalog>,
    ) -> Self {
        Self::build(settings, unit_loader, Some(catalog))
    }

    fn build(
        settings: RegistrySettings,
        unit_loader: Arc<dyn UnitLoader>,
        remote: Option<Arc<dyn RemoteCatalog>>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                state: RwLock::new(State::default()),
                unit_loader,
                remote,
                config_loads: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register the built-in `Package`, `Alias`, `Module`, `Script` and
    /// `Config` constructors.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyDefined`] if any built-in tag is
    /// already registered.
    pub fn with_builtin_types(self) -> RegistryResult<Self> {
        for (tag, constructor) in entry::builtin_types() {
            self.define_type(tag, constructor)?;
        }
        Ok(self)
    }

    /// The registry settings.
    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    /// Whether configs are fetched from a remote catalog.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    pub(crate) fn unit_loader(&self) -> &dyn UnitLoader {
        self.inner.unit_loader.as_ref()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(|e| {
            warn!("Registry lock poisoned, recovering");
            PoisonError::into_inner(e)
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(|e| {
            warn!("Registry lock poisoned, recovering");
            PoisonError::into_inner(e)
        })
    }

    fn admits(&self, id: &EntryId) -> bool {
        self.inner
            .settings
            .root_key
            .as_deref()
            .is_none_or(|root| id.root().eq_ignore_ascii_case(root))
    }

    /// Add a batch of configs.
    ///
    /// Configs outside the root key are dropped. The batch is all-or-nothing:
    /// if any ID is already taken (or repeated inside the batch) nothing is
    /// added. A local registry checks against `available`; a remote one
    /// against the resident configs, since its `available` set is filled
    /// ahead of the configs.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyDefined`] listing the colliding IDs.
    pub fn add_config(&self, configs: impl IntoIterator<Item = EntryConfig>) -> RegistryResult<()> {
        let configs = self.admitted(configs);

        let mut state = self.write_state();
        let mut batch = HashSet::new();
        let mut existing = Vec::new();
        for config in &configs {
            let taken = if self.is_remote() {
                state.configs.contains_key(&config.id)
            } else {
                state.available.contains(&config.id)
            };
            if taken || !batch.insert(config.id.as_str()) {
                existing.push(config.id.to_string());
            }
        }
        if !existing.is_empty() {
            return Err(RegistryError::AlreadyDefined(existing));
        }

        let count = configs.len();
        for config in configs {
            state.available.insert(config.id.clone());
            state.configs.insert(config.id.clone(), config);
        }
        debug!(count, "Added configs");
        Ok(())
    }

    /// Add fetched configs, skipping IDs that are already resident. The
    /// residency check and the insert share one critical section, so
    /// concurrent fetches delivering a common ancestor never collide.
    /// Returns how many configs were added.
    pub(crate) fn add_fetched(&self, configs: impl IntoIterator<Item = EntryConfig>) -> usize {
        let configs = self.admitted(configs);

        let mut state = self.write_state();
        let mut added = 0usize;
        for config in configs {
            if state.configs.contains_key(&config.id) {
                debug!(entry_id = %config.id, "Config already resident, skipping");
                continue;
            }
            state.available.insert(config.id.clone());
            state.configs.insert(config.id.clone(), config);
            added = added.saturating_add(1);
        }
        debug!(added, "Added fetched configs");
        added
    }

    fn admitted(&self, configs: impl IntoIterator<Item = EntryConfig>) -> Vec<EntryConfig> {
        configs
            .into_iter()
            .filter(|config| {
                let admitted = self.admits(&config.id);
                if !admitted {
                    warn!(entry_id = %config.id, "Dropping config outside the library root");
                }
                admitted
            })
            .collect()
    }

    /// The resident config for `id`.
    #[must_use]
    pub fn get_config(&self, id: &str) -> Option<EntryConfig> {
        self.read_state().configs.get(id).cloned()
    }

    /// The config for `id`, fetching it if it is not resident.
    ///
    /// A remote registry fetches `id` together with every missing ancestor
    /// prefix; concurrent requests for the same ID share one fetch. A local
    /// registry cannot fetch.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unsupported`] for a local registry asked for
    /// an available but non-resident ID, [`RegistryError::InvalidContext`] if
    /// the fetched document belongs to another library, and any transport
    /// error from the catalog.
    pub async fn load_config(&self, id: &str) -> RegistryResult<Option<EntryConfig>> {
        if let Some(config) = self.get_config(id) {
            return Ok(Some(config));
        }
        let Some(catalog) = self.inner.remote.clone() else {
            if self.is_available(id) {
                return Err(RegistryError::Unsupported(format!(
                    "loading available config {id} is not implemented"
                )));
            }
            return Ok(None);
        };
        let key = EntryId::new(id)?;

        let operation = {
            let mut loads = self
                .inner
                .config_loads
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = self.get_config(id) {
                return Ok(Some(config));
            }
            if let Some(existing) = loads.get(&key) {
                existing.clone()
            } else {
                let fresh = fetch_configs(self.clone(), catalog, key.clone())
                    .boxed()
                    .shared();
                loads.insert(key.clone(), fresh.clone());
                fresh
            }
        };

        let outcome = operation.clone().await;

        let mut loads = self
            .inner
            .config_loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if loads.get(&key).is_some_and(|current| current.ptr_eq(&operation)) {
            loads.remove(&key);
        }
        outcome
    }

    /// Discover configs under `root` and add them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CorruptedCatalog`] if the scan repeats an ID
    /// (nothing is added), [`RegistryError::AlreadyDefined`] if a discovered
    /// ID is already taken, or a scan error.
    pub async fn load_available(
        &self,
        scanner: &DirectoryScanner,
        root: &Path,
        max_depth: i32,
    ) -> RegistryResult<usize> {
        let configs = scan_catalog(scanner, root, max_depth).await?;
        let count = configs.len();
        self.add_config(configs)?;
        info!(root = %root.display(), count, "Catalog loaded");
        Ok(count)
    }

    /// Fill the available set from the remote catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unsupported`] for a local registry, or the
    /// catalog's transport error.
    pub async fn load_remote_available(&self) -> RegistryResult<usize> {
        let Some(catalog) = self.inner.remote.clone() else {
            return Err(RegistryError::Unsupported(
                "no remote catalog configured".to_owned(),
            ));
        };
        let ids = catalog.available().await?;

        let mut state = self.write_state();
        let before = state.available.len();
        for raw in ids {
            match EntryId::new(raw) {
                Ok(id) if self.admits(&id) => {
                    state.available.insert(id);
                },
                Ok(id) => debug!(entry_id = %id, "Ignoring remote id outside the library root"),
                Err(e) => debug!(error = %e, "Ignoring malformed remote id"),
            }
        }
        let added = state.available.len().saturating_sub(before);
        info!(added, total = state.available.len(), "Remote catalog available");
        Ok(added)
    }

    /// Every available ID, sorted.
    #[must_use]
    pub fn available(&self) -> Vec<EntryId> {
        self.read_state().available.iter().cloned().collect()
    }

    /// Whether `id` is available.
    #[must_use]
    pub fn is_available(&self, id: &str) -> bool {
        self.read_state().available.contains(id)
    }

    /// The `available.json` body this registry would serve.
    #[must_use]
    pub fn available_ids(&self) -> Vec<String> {
        self.read_state()
            .available
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// The `config.json` document this registry would serve for `ids`.
    #[must_use]
    pub fn config_document(&self, ids: &[&str]) -> ConfigDocument {
        let configs = {
            let state = self.read_state();
            ids.iter().map(|id| state.configs.get(*id).cloned()).collect()
        };
        ConfigDocument::new(&self.inner.settings.context, configs)
    }

    /// Register the constructor for configs tagged `type_tag`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyDefined`] if the tag is taken, or
    /// [`RegistryError::InvalidArguments`] if it is not a word.
    pub fn define_type(&self, type_tag: &str, constructor: EntryConstructor) -> RegistryResult<()> {
        let mut state = self.write_state();
        if state.types.contains_key(type_tag) {
            return Err(RegistryError::AlreadyDefined(vec![type_tag.to_owned()]));
        }
        if !TypeTag::is_valid(type_tag) {
            return Err(RegistryError::InvalidArguments(format!(
                "invalid type tag: {type_tag:?}"
            )));
        }
        state.types.insert(type_tag.to_owned(), constructor);
        debug!(type_tag, "Defined entry type");
        Ok(())
    }

    /// Construct entries for `ids`.
    ///
    /// IDs without a resident config or a registered type are skipped, as
    /// are IDs already constructed.
    ///
    /// # Errors
    ///
    /// Propagates construction and integration failures.
    pub fn make_entries(&self, ids: &[&str]) -> RegistryResult<()> {
        for id in ids {
            self.make_entry(id)?;
        }
        Ok(())
    }

    fn make_entry(&self, id: &str) -> RegistryResult<Option<Arc<Entry>>> {
        let (config, constructor) = {
            let state = self.read_state();
            if let Some(entry) = state.entries.get(id) {
                return Ok(Some(Arc::clone(entry)));
            }
            let Some(config) = state.configs.get(id) else {
                return Ok(None);
            };
            let Some(constructor) = state.types.get(config.type_tag.as_str()) else {
                debug!(entry_id = %id, type_tag = %config.type_tag, "No constructor for type");
                return Ok(None);
            };
            (config.clone(), *constructor)
        };

        let kind = constructor(&config)?;
        let entry = Arc::new(Entry::new(&config, kind));
        integrate(self, entry).map(Some)
    }

    /// Store a constructed entry, attaching it to `parent`.
    ///
    /// If an entry for the same ID was stored in the meantime, that entry is
    /// kept and returned.
    pub(crate) fn store_entry(
        &self,
        entry: Arc<Entry>,
        parent: Option<&Arc<Entry>>,
    ) -> RegistryResult<Arc<Entry>> {
        let mut state = self.write_state();
        if let Some(existing) = state.entries.get(entry.id()) {
            return Ok(Arc::clone(existing));
        }
        if let Some(package) = parent.and_then(|p| p.as_package()) {
            package.add(entry.id().last_segment(), &entry)?;
        }
        debug!(entry_id = %entry.id(), kind = entry.kind_name(), "Entry constructed");
        state.entries.insert(entry.id().clone(), Arc::clone(&entry));
        Ok(entry)
    }

    /// The entry for `id`, constructing it if it is available with a
    /// resident config.
    ///
    /// # Errors
    ///
    /// Propagates construction and integration failures.
    pub fn get_entry(&self, id: &str) -> RegistryResult<Option<Arc<Entry>>> {
        {
            let state = self.read_state();
            if let Some(entry) = state.entries.get(id) {
                return Ok(Some(Arc::clone(entry)));
            }
            if !state.available.contains(id) {
                return Ok(None);
            }
        }
        self.make_entry(id)
    }

    /// Like [`Registry::get_entry`], fetching the config first if needed.
    ///
    /// # Errors
    ///
    /// Propagates fetch, construction and integration failures.
    pub async fn load_entry(&self, id: &str) -> RegistryResult<Option<Arc<Entry>>> {
        {
            let state = self.read_state();
            if let Some(entry) = state.entries.get(id) {
                return Ok(Some(Arc::clone(entry)));
            }
            if !state.available.contains(id) {
                return Ok(None);
            }
        }
        if self.get_config(id).is_none() {
            self.load_config(id).await?;
        }
        self.make_entry(id)
    }

    /// A dependency cycle through `id`, following `requires` and `target`
    /// edges of resident configs. The chain starts and ends with `id`.
    #[must_use]
    pub fn find_cycle(&self, id: &EntryId) -> Option<Vec<EntryId>> {
        let state = self.read_state();
        let mut path = vec![id.clone()];
        let mut visited = HashSet::new();
        if walk_edges(&state.configs, id, &mut path, &mut visited) {
            Some(path)
        } else {
            None
        }
    }
}

/// Depth-first search for `start` along config edges. On success `path`
/// holds the cycle.
fn walk_edges(
    configs: &HashMap<EntryId, EntryConfig>,
    start: &EntryId,
    path: &mut Vec<EntryId>,
    visited: &mut HashSet<EntryId>,
) -> bool {
    let Some(current) = path.last().cloned() else {
        return false;
    };
    let Some(config) = configs.get(&current) else {
        return false;
    };
    for next in config.edges() {
        if &next == start {
            path.push(next);
            return true;
        }
        if !visited.insert(next.clone()) {
            continue;
        }
        path.push(next);
        if walk_edges(configs, start, path, visited) {
            return true;
        }
        path.pop();
    }
    false
}

/// Fetch `id` and its missing ancestors from `catalog` and add them.
async fn fetch_configs(
    registry: Registry,
    catalog: Arc<dyn RemoteCatalog>,
    id: EntryId,
) -> RegistryResult<Option<EntryConfig>> {
    let missing: Vec<String> = id::ancestors(id.as_str())
        .into_iter()
        .filter(|prefix| registry.get_config(prefix).is_none())
        .collect();
    debug!(entry_id = %id, missing = ?missing, "Fetching configs");

    let document = catalog.configs(&missing).await?;
    let configs = document.into_configs(&registry.inner.settings.context)?;

    // Another fetch may have delivered a shared ancestor meanwhile.
    registry.add_fetched(configs);
    Ok(registry.get_config(id.as_str()))
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("Registry")
            .field("settings", &self.inner.settings)
            .field("available", &state.available.len())
            .field("configs", &state.configs.len())
            .field("entries", &state.entries.len())
            .field("remote", &self.is_remote())
            .finish()
    }
}
