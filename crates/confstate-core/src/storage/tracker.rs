//! Routing of external file-change events to the storages that own the files.
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kernel::error::Result;
use crate::storage::state::StateStorage;

/// Registry of storages by absolute backing path
pub trait ChangeTracker: Send + Sync + Debug {
    /// Register `storage` under `path`, replacing any previous registration
    fn put(&self, path: PathBuf, storage: Arc<dyn StateStorage>) -> Result<()>;

    /// Drop the registration for `path`. Unknown paths are a no-op.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Whether `path` is registered
    fn contains(&self, path: &Path) -> bool;

    /// Drop every registration matching `predicate`, returning how many were dropped
    fn remove_where(&self, predicate: &dyn Fn(&Path, &dyn StateStorage) -> bool) -> usize;

    /// Storage registered for `path`, or for the nearest registered ancestor directory
    fn storage_for(&self, path: &Path) -> Option<Arc<dyn StateStorage>>;

    /// Deliver a change event for `path`. Returns whether a storage received it.
    fn notify_changed(&self, path: &Path) -> Result<bool> {
        match self.storage_for(path) {
            Some(storage) => {
                log::debug!("Routing change of {} to storage '{}'", path.display(), storage.spec());
                storage.handle_external_change(path)?;
                Ok(true)
            }
            None => {
                log::trace!("No storage registered for changed path {}", path.display());
                Ok(false)
            }
        }
    }
}

/// In-process change tracker; can be shared by several managers
#[derive(Debug, Default)]
pub struct InMemoryChangeTracker {
    entries: RwLock<HashMap<PathBuf, Arc<dyn StateStorage>>>,
}

impl InMemoryChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ChangeTracker for InMemoryChangeTracker {
    fn put(&self, path: PathBuf, storage: Arc<dyn StateStorage>) -> Result<()> {
        log::trace!("Tracking {} for storage '{}'", path.display(), storage.spec());
        self.entries.write().insert(path, storage);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.entries.write().remove(path);
        Ok(())
    }

    fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    fn remove_where(&self, predicate: &dyn Fn(&Path, &dyn StateStorage) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path, storage| !predicate(path, storage.as_ref()));
        before - entries.len()
    }

    fn storage_for(&self, path: &Path) -> Option<Arc<dyn StateStorage>> {
        let entries = self.entries.read();
        path.ancestors().find_map(|candidate| entries.get(candidate).cloned())
    }
}
