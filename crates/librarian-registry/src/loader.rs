//! The load protocol shared by modules and aliases.
//!
//! Each loadable entry owns a [`LoadCell`]: the published exports plus a
//! single-flight slot. The first caller of `load()` installs a shared future
//! in the slot; every other caller, concurrent or re-entrant, awaits that
//! same future. The slot is cleared once the operation settles, so a failed
//! load can be retried later.
//!
//! ```text
//! Unloaded --load()--> Loading --ok--> Loaded
//!                         |
//!                         +--err--> Unloaded (slot cleared)
//! ```

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use tracing::{debug, info, warn};

use crate::entry::{Entry, EntryKind};
use crate::error::{RegistryError, RegistryResult};
use crate::exports::Exports;
use crate::id::EntryId;
use crate::registry::Registry;

/// Outcome of a load: exports, `None` for an unresolved alias, or an error.
pub type LoadOutcome = RegistryResult<Option<Exports>>;

type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

/// Observable load state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Not loaded and no load in flight.
    Unloaded,
    /// A load operation is in flight.
    Loading,
    /// Exports are published.
    Loaded,
}

/// Published exports plus the single-flight slot.
pub(crate) struct LoadCell {
    exports: RwLock<Option<Exports>>,
    in_flight: Mutex<Option<SharedLoad>>,
}

impl LoadCell {
    pub(crate) fn new() -> Self {
        Self {
            exports: RwLock::new(None),
            in_flight: Mutex::new(None),
        }
    }

    pub(crate) fn exports(&self) -> Option<Exports> {
        self.exports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn state(&self) -> LoadState {
        if self.exports().is_some() {
            return LoadState::Loaded;
        }
        let slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            LoadState::Loading
        } else {
            LoadState::Unloaded
        }
    }

    fn publish(&self, exports: Exports) {
        let mut guard = self.exports.write().unwrap_or_else(|e| {
            warn!("LoadCell lock poisoned, recovering");
            PoisonError::into_inner(e)
        });
        *guard = Some(exports);
    }

    /// Run `start` at most once at a time and share its outcome.
    pub(crate) async fn run<F>(&self, start: F) -> LoadOutcome
    where
        F: FnOnce() -> BoxFuture<'static, LoadOutcome>,
    {
        if let Some(exports) = self.exports() {
            return Ok(Some(exports));
        }

        let operation = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // Published exports are set before the slot is cleared, so seeing
            // an empty slot here means nothing is running.
            if let Some(exports) = self.exports() {
                return Ok(Some(exports));
            }
            if let Some(existing) = slot.as_ref() {
                existing.clone()
            } else {
                let fresh = start().shared();
                *slot = Some(fresh.clone());
                fresh
            }
        };

        let outcome = operation.clone().await;

        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&operation)) {
            *slot = None;
        }
        outcome
    }
}

/// Executes the unit behind a module's `path`.
///
/// Injected into the registry; the core only requires that it is async.
#[async_trait]
pub trait UnitLoader: Send + Sync {
    /// Load the unit for module `id` located at `path`.
    async fn load_unit(&self, id: &EntryId, path: &str) -> RegistryResult<Exports>;
}

/// Loads units from the local file system.
///
/// `.json` files are parsed into [`Exports::Value`]; any other file is
/// exposed as its text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileUnitLoader;

#[async_trait]
impl UnitLoader for FileUnitLoader {
    async fn load_unit(&self, id: &EntryId, path: &str) -> RegistryResult<Exports> {
        let unit_path = Path::new(path);
        let content =
            tokio::fs::read_to_string(unit_path)
                .await
                .map_err(|e| RegistryError::UnitLoad {
                    id: id.to_string(),
                    message: format!("{path}: {e}"),
                })?;

        let is_json = unit_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Ok(Exports::Value(serde_json::Value::String(content)));
        }

        serde_json::from_str(&content)
            .map(Exports::Value)
            .map_err(|e| RegistryError::Parse {
                source_name: path.to_owned(),
                message: e.to_string(),
            })
    }
}

type UnitFn = dyn Fn(&EntryId, &str) -> BoxFuture<'static, RegistryResult<Exports>> + Send + Sync;

/// Adapts a closure into a [`UnitLoader`].
#[derive(Clone)]
pub struct FnUnitLoader(Arc<UnitFn>);

impl FnUnitLoader {
    /// Wrap `body`.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&EntryId, &str) -> BoxFuture<'static, RegistryResult<Exports>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(body))
    }
}

impl fmt::Debug for FnUnitLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnUnitLoader(..)")
    }
}

#[async_trait]
impl UnitLoader for FnUnitLoader {
    async fn load_unit(&self, id: &EntryId, path: &str) -> RegistryResult<Exports> {
        (self.0)(id, path).await
    }
}

/// Fetches units over HTTP from `<base>/<root_key>/<path>`.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpUnitLoader {
    client: reqwest::Client,
    base: url::Url,
}

#[cfg(feature = "http")]
impl HttpUnitLoader {
    /// Serve units from the library mounted at `base` under `root_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArguments`] if the URL cannot be
    /// joined.
    pub fn new(base: &url::Url, root_key: &str) -> RegistryResult<Self> {
        let base = base
            .join(&format!("{root_key}/"))
            .map_err(|e| RegistryError::InvalidArguments(format!("unit base url: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl UnitLoader for HttpUnitLoader {
    async fn load_unit(&self, id: &EntryId, path: &str) -> RegistryResult<Exports> {
        let unit_load = |message: String| RegistryError::UnitLoad {
            id: id.to_string(),
            message,
        };
        let url = self
            .base
            .join(path)
            .map_err(|e| unit_load(format!("{path}: {e}")))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unit_load(e.to_string()))?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let body = response.text().await.map_err(|e| unit_load(e.to_string()))?;
        if !is_json {
            return Ok(Exports::Value(serde_json::Value::String(body)));
        }
        serde_json::from_str(&body)
            .map(Exports::Value)
            .map_err(|e| RegistryError::Parse {
                source_name: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// The shared load operation of a module.
///
/// Resolves every required ID, loads the unloaded ones concurrently, then
/// runs the unit loader and publishes the result.
pub(crate) fn module_operation(
    entry: Arc<Entry>,
    registry: Registry,
) -> BoxFuture<'static, LoadOutcome> {
    async move {
        let EntryKind::Module(module) = entry.kind() else {
            return Err(RegistryError::Unsupported(format!(
                "{} is not a module",
                entry.id()
            )));
        };
        let id = entry.id().clone();
        debug!(entry_id = %id, requires = module.requires().len(), "Loading module");

        // (a) resolve every dependency to an entry
        let resolved = try_join_all(module.requires().iter().map(|dep| {
            let registry = registry.clone();
            async move { registry.load_entry(dep.as_str()).await }
        }))
        .await?;

        let mut dependencies = Vec::with_capacity(resolved.len());
        for (dep_id, dep) in module.requires().iter().zip(resolved) {
            let dep = dep.ok_or_else(|| RegistryError::MissingDependency {
                id: id.to_string(),
                dependency: dep_id.to_string(),
            })?;
            dependencies.push(dep);
        }

        if let Some(chain) = registry.find_cycle(&id) {
            return Err(RegistryError::CyclicDependency(
                chain.iter().map(ToString::to_string).collect(),
            ));
        }

        // (b) load the unloaded ones concurrently
        try_join_all(dependencies.iter().filter(|dep| !dep.is_loaded()).map(|dep| {
            let id = id.clone();
            let dep_id = dep.id().clone();
            dep.load(&registry).map(move |outcome| {
                outcome.map_err(|e| RegistryError::DependencyLoadFailed {
                    id: id.to_string(),
                    dependency: dep_id.to_string(),
                    message: e.to_string(),
                })
            })
        }))
        .await?;

        if let Some(dep) = dependencies.iter().find(|dep| !dep.is_loaded()) {
            return Err(RegistryError::DependencyLoadFailed {
                id: id.to_string(),
                dependency: dep.id().to_string(),
                message: "dependency did not reach the loaded state".to_owned(),
            });
        }

        // (c) run the unit, (d) publish
        let exports = registry.unit_loader().load_unit(&id, module.path()).await?;
        module.cell.publish(exports.clone());
        info!(entry_id = %id, path = module.path(), "Module loaded");
        Ok(Some(exports))
    }
    .boxed()
}

/// The shared load operation of an alias.
///
/// An unresolvable target yields `Ok(None)` and leaves the alias unloaded.
pub(crate) fn alias_operation(
    entry: Arc<Entry>,
    registry: Registry,
) -> BoxFuture<'static, LoadOutcome> {
    async move {
        let EntryKind::Alias(alias) = entry.kind() else {
            return Err(RegistryError::Unsupported(format!(
                "{} is not an alias",
                entry.id()
            )));
        };
        let id = entry.id().clone();

        let Some(target) = registry.load_entry(alias.target().as_str()).await? else {
            debug!(entry_id = %id, target = %alias.target(), "Alias target not resolvable yet");
            return Ok(None);
        };

        if let Some(chain) = registry.find_cycle(&id) {
            return Err(RegistryError::CyclicDependency(
                chain.iter().map(ToString::to_string).collect(),
            ));
        }

        if !target.is_loaded() {
            target.load(&registry).await?;
        }
        let Some(exports) = target.exports() else {
            debug!(entry_id = %id, target = %target.id(), "Alias target did not load");
            return Ok(None);
        };

        alias.cell.publish(exports.clone());
        debug!(entry_id = %id, target = %target.id(), "Alias resolved");
        Ok(Some(exports))
    }
    .boxed()
}
