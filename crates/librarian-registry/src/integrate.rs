//! Attaching freshly constructed entries to their parent package.

use std::sync::Arc;

use tracing::debug;

use crate::entry::Entry;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;

/// Resolve the parent package of `entry` and store the entry.
///
/// Root IDs have no parent. Every other ID needs its parent to resolve,
/// through [`Registry::get_entry`], to a `Package`. Returns the stored
/// entry, which is an earlier one if another caller won the race.
///
/// # Errors
///
/// Returns [`RegistryError::OrphanEntry`] if the parent is missing or is not
/// a package, and [`RegistryError::DuplicateKey`] if the parent already holds
/// a different child under the same key.
pub(crate) fn integrate(registry: &Registry, entry: Arc<Entry>) -> RegistryResult<Arc<Entry>> {
    let Some(parent_id) = entry.id().parent() else {
        debug!(entry_id = %entry.id(), "Integrating namespace root");
        return registry.store_entry(entry, None);
    };

    let parent = registry
        .get_entry(parent_id.as_str())?
        .filter(|p| p.as_package().is_some())
        .ok_or_else(|| RegistryError::OrphanEntry {
            id: entry.id().to_string(),
            parent: parent_id.to_string(),
        })?;

    debug!(entry_id = %entry.id(), parent = %parent_id, "Integrating entry");
    registry.store_entry(entry, Some(&parent))
}
