//! Capabilities the manager consumes: storages, their hooks, creators and splitters.
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kernel::constants::{STORAGE_FORMAT_VERSION, VERSION_ATTRIBUTE};
use crate::kernel::error::Result;
use crate::storage::config::ConfigData;
use crate::storage::factory::CreationContext;
use crate::storage::macros::SharedMacroTable;

/// Component name -> state, as held by one storage
pub type ComponentStates = BTreeMap<String, ConfigData>;

/// Document-level attributes of a storage file
pub type StorageAttributes = BTreeMap<String, String>;

/// Result of saving one storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing changed since the last load or save
    Unchanged,
    /// Written to the local file or directory
    Local,
    /// Written to the stream provider only
    Provider,
    /// Written both locally and to the stream provider
    LocalAndProvider,
}

impl SaveOutcome {
    pub fn wrote_anything(self) -> bool {
        self != SaveOutcome::Unchanged
    }
}

/// Change in the data a stream provider holds for a storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderDataChange {
    /// Provider finished loading new remote content
    Loaded,
    /// Provider persisted our content
    Saved,
    /// Provider dropped its content
    Reset,
}

/// Trait implemented by every storage the manager hands out
pub trait StateStorage: Send + Sync + Debug {
    /// Logical spec this storage was created for
    fn spec(&self) -> &str;

    /// Get the state of a component, loading lazily
    fn get_state(&self, component: &str) -> Result<Option<ConfigData>>;

    /// Replace the state of a component
    fn set_state(&self, component: &str, state: ConfigData) -> Result<()>;

    /// Remove the state of a component
    fn remove_state(&self, component: &str) -> Result<Option<ConfigData>>;

    /// Names of all components with state
    fn component_names(&self) -> Result<Vec<String>>;

    /// Whether there are unsaved changes
    fn is_dirty(&self) -> bool;

    /// Persist unsaved changes
    fn save(&self) -> Result<SaveOutcome>;

    /// The backing file or directory changed outside the manager
    fn handle_external_change(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Change-routing view, for storages registered with a tracker
    fn as_tracked(&self) -> Option<&dyn TrackedStorage> {
        None
    }

    /// Backing file of a single-file storage
    fn file_path(&self) -> Option<PathBuf> {
        None
    }
}

/// A storage whose backing path is registered for external change routing
pub trait TrackedStorage: Send + Sync {
    /// Absolute path the storage is registered under
    fn tracked_path(&self) -> PathBuf;

    /// Point the storage at a new path, after a rename
    fn set_tracked_path(&self, path: PathBuf) -> Result<()>;

    /// The stream provider's copy of this storage's data changed
    fn provider_data_state_changed(&self, change: ProviderDataChange);
}

/// Hooks a storage invokes around serialization.
///
/// Implementations may only touch the arguments they are given.
pub trait StorageHooks: Send + Sync + Debug {
    fn before_element_saved(&self, _elements: &mut ComponentStates, _attributes: &mut StorageAttributes) {}

    fn before_element_loaded(&self, _element: &mut ConfigData) {}
}

/// Stamps the document version on save and strips `$`-prefixed metadata on load
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStorageHooks;

impl StorageHooks for DefaultStorageHooks {
    fn before_element_saved(&self, _elements: &mut ComponentStates, attributes: &mut StorageAttributes) {
        attributes.insert(VERSION_ATTRIBUTE.to_string(), STORAGE_FORMAT_VERSION.to_string());
    }

    fn before_element_loaded(&self, element: &mut ConfigData) {
        element.retain(|key, _| !key.starts_with('$'));
    }
}

/// Substitutes path macros inside stored values
pub trait PathMacroSubstitutor: Send + Sync + Debug {
    /// Replace macros with absolute paths, applied on load
    fn expand_text(&self, text: &str) -> String;

    /// Replace absolute paths with macros, applied on save
    fn collapse_text(&self, text: &str) -> String;
}

/// Substitutor backed by the manager's live macro table
#[derive(Debug, Clone)]
pub struct MacroTableSubstitutor {
    macros: Arc<SharedMacroTable>,
}

impl MacroTableSubstitutor {
    pub fn new(macros: Arc<SharedMacroTable>) -> Self {
        Self { macros }
    }

    /// (key, expanded value) pairs, longest value first
    fn expanded_pairs(&self) -> Vec<(String, String)> {
        let table = self.macros.snapshot();
        let mut pairs: Vec<(String, String)> = table
            .macros()
            .iter()
            .filter_map(|m| table.expand_to_string(&m.key).ok().map(|v| (m.key.clone(), v)))
            .filter(|(_, v)| v.len() > 1)
            .collect();
        pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        pairs
    }
}

impl PathMacroSubstitutor for MacroTableSubstitutor {
    fn expand_text(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        let mut expanded = text.to_string();
        for (key, value) in self.expanded_pairs() {
            expanded = expanded.replace(&key, &value);
        }
        expanded
    }

    fn collapse_text(&self, text: &str) -> String {
        let mut collapsed = text.to_string();
        for (key, value) in self.expanded_pairs() {
            collapsed = collapsed.replace(&value, &key);
        }
        collapsed
    }
}

/// Builds a storage outside the file/directory kinds, under its own cache key
pub trait StorageCreator: Send + Sync {
    /// Cache key; requests with equal keys share one storage
    fn key(&self) -> String;

    /// Build the storage. Runs under the cache write lock.
    fn create(&self, context: &CreationContext<'_>) -> Result<Arc<dyn StateStorage>>;
}

/// Splits component state across the files of a directory storage
pub trait StateSplitter: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// File name -> part of `state`
    fn split(&self, component: &str, state: &ConfigData) -> Vec<(String, ConfigData)>;

    /// Rebuild component state from its parts
    fn merge(&self, component: &str, parts: Vec<(String, ConfigData)>) -> ConfigData {
        let _ = component;
        let mut merged = ConfigData::new();
        for (_, part) in parts {
            merged.merge(&part);
        }
        merged
    }
}

/// Callback applied to a storage every time it is requested
pub type StorageCustomizer = Arc<dyn Fn(&dyn StateStorage) + Send + Sync>;
