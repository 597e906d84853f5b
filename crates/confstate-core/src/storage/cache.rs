//! Concurrent key -> storage map with at-most-once construction per key.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kernel::error::{Error, Result};
use crate::storage::state::{StateStorage, StorageCustomizer};

/// Cache of every storage a manager has handed out.
///
/// One lock guards the whole map. Hits only take the read lock; construction runs
/// under the write lock, so first accesses to different keys are serialized.
#[derive(Default)]
pub struct StorageCache {
    storages: RwLock<HashMap<String, Arc<dyn StateStorage>>>,
}

impl fmt::Debug for StorageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.storages.read().keys().cloned().collect();
        keys.sort();
        f.debug_struct("StorageCache")
            .field("keys", &keys)
            .finish()
    }
}

impl StorageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the storage for `key`, building it with `create` on first access.
    ///
    /// `customizer` runs on every call, hit or miss; it must be idempotent.
    pub fn get_or_create<F>(
        &self,
        key: &str,
        create: F,
        customizer: Option<&StorageCustomizer>,
    ) -> Result<Arc<dyn StateStorage>>
    where
        F: FnOnce() -> Result<Arc<dyn StateStorage>>,
    {
        let cached = self.storages.read().get(key).cloned();
        if let Some(existing) = cached {
            if let Some(customize) = customizer {
                customize(existing.as_ref());
            }
            return Ok(existing);
        }

        let mut storages = self.storages.write();
        if let Some(existing) = storages.get(key).cloned() {
            drop(storages);
            if let Some(customize) = customizer {
                customize(existing.as_ref());
            }
            return Ok(existing);
        }

        log::debug!("Creating storage for key '{}'", key);
        let storage = create()?;
        if let Some(customize) = customizer {
            customize(storage.as_ref());
        }
        storages.insert(key.to_string(), storage.clone());
        Ok(storage)
    }

    /// Point lookup without construction
    pub fn get(&self, key: &str) -> Option<Arc<dyn StateStorage>> {
        self.storages.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storages.read().contains_key(key)
    }

    /// Copy of every cached storage
    pub fn snapshot(&self) -> Vec<Arc<dyn StateStorage>> {
        self.storages.read().values().cloned().collect()
    }

    /// Cached keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.storages.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// File-backed storages cached under the given specs.
    ///
    /// `normalizer` maps each spec to its cache key; specs are used as is without one.
    pub fn file_storages_matching(
        &self,
        specs: &[String],
        normalizer: Option<&dyn Fn(&str) -> String>,
    ) -> Vec<Arc<dyn StateStorage>> {
        let storages = self.storages.read();
        specs
            .iter()
            .filter_map(|spec| {
                let key = match normalizer {
                    Some(normalize) => normalize(spec),
                    None => spec.clone(),
                };
                storages.get(&key).cloned()
            })
            .filter(|storage| storage.file_path().is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.storages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.read().is_empty()
    }

    /// Empty the cache, calling `on_remove` for every entry first.
    ///
    /// Failures of `on_remove` are collected and returned; the map is empty either way.
    pub fn clear<F>(&self, mut on_remove: F) -> Vec<Error>
    where
        F: FnMut(&str, &dyn StateStorage) -> Result<()>,
    {
        let mut storages = self.storages.write();
        let drained = std::mem::take(&mut *storages);
        let mut failures = Vec::new();
        for (key, storage) in &drained {
            if let Err(e) = on_remove(key, storage.as_ref()) {
                failures.push(e);
            }
        }
        failures
    }
}
