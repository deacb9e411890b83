//! Shared helpers for registry integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use librarian_registry::{
    EntryConfig, Exports, FnUnitLoader, Registry, RegistryError, RegistrySettings, UnitLoader,
};
use serde_json::json;

/// Ordered log of unit loader activity.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl Journal {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }
}

/// Toggle controlling whether `flaky` units succeed.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Switch(Arc<AtomicBool>);

#[allow(dead_code)]
impl Switch {
    pub fn turn_on(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A unit loader that records `start <id>` / `done <id>` events.
///
/// Paths containing `slow` sleep before finishing; paths containing `flaky`
/// fail until the switch is on. Exports are `{"id": <id>}`.
#[allow(dead_code)]
pub fn recording_loader(journal: &Journal, switch: &Switch) -> Arc<dyn UnitLoader> {
    let journal = journal.clone();
    let switch = switch.clone();
    Arc::new(FnUnitLoader::new(move |id, path| {
        let journal = journal.clone();
        let switch = switch.clone();
        let id = id.to_string();
        let path = path.to_owned();
        async move {
            journal.push(format!("start {id}"));
            if path.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if path.contains("flaky") && !switch.is_on() {
                journal.push(format!("fail {id}"));
                return Err(RegistryError::UnitLoad {
                    id,
                    message: "flaky unit".to_owned(),
                });
            }
            journal.push(format!("done {id}"));
            Ok(Exports::Value(json!({ "id": id })))
        }
        .boxed()
    }))
}

/// A local registry with the built-in types and a recording loader.
#[allow(dead_code)]
pub fn registry(journal: &Journal, switch: &Switch) -> Registry {
    Registry::with_unit_loader(RegistrySettings::default(), recording_loader(journal, switch))
        .with_builtin_types()
        .unwrap()
}

/// Shorthand for a module config.
#[allow(dead_code)]
pub fn module(id: &str, path: &str, requires: &[&str]) -> EntryConfig {
    EntryConfig::module(id, path, requires).unwrap()
}

/// Shorthand for a package config.
#[allow(dead_code)]
pub fn package(id: &str) -> EntryConfig {
    EntryConfig::package(id).unwrap()
}

/// Write `value` as JSON at `dir/rel`, creating parent directories.
#[allow(dead_code)]
pub fn write_json(dir: &Path, rel: &str, value: &serde_json::Value) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}
