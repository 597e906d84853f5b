//! The storage manager: maps file specs to cached storage instances.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kernel::error::{Error, Result};
use crate::storage::cache::StorageCache;
use crate::storage::config::ConfigFormat;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::{StorageFactory, StorageRequest};
use crate::storage::key::{compute_storage_key, normalize_spec, StorageClass};
use crate::storage::macros::{Macro, MacroTable, SharedMacroTable};
use crate::storage::registry::{CustomStorageFactory, CustomStorageRegistry};
use crate::storage::roaming::{effective_roaming_type, RoamingType, VfsListenerState};
use crate::storage::settings::ManagerSettings;
use crate::storage::state::{
    DefaultStorageHooks, MacroTableSubstitutor, PathMacroSubstitutor, ProviderDataChange, SaveOutcome,
    StateSplitter, StateStorage, StorageCreator, StorageCustomizer, StorageHooks,
};
use crate::storage::stream::{CompoundStreamProvider, StreamProvider};
use crate::storage::tracker::{ChangeTracker, InMemoryChangeTracker};

/// A request for a storage
#[derive(Clone)]
pub struct StorageSpec {
    path: String,
    roaming: RoamingType,
    class: StorageClass,
    splitter: Option<Arc<dyn StateSplitter>>,
    exclusive: bool,
    creator: Option<Arc<dyn StorageCreator>>,
    customizer: Option<StorageCustomizer>,
}

impl StorageSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            roaming: RoamingType::Default,
            class: StorageClass::Default,
            splitter: None,
            exclusive: false,
            creator: None,
            customizer: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn roaming(mut self, roaming: RoamingType) -> Self {
        self.roaming = roaming;
        self
    }

    pub fn class(mut self, class: StorageClass) -> Self {
        self.class = class;
        self
    }

    /// Use the custom storage type registered under `tag`
    pub fn custom_class(self, tag: impl Into<String>) -> Self {
        self.class(StorageClass::custom(tag))
    }

    /// Store the spec as a directory, split into files by `splitter`
    pub fn splitter(mut self, splitter: Arc<dyn StateSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn creator(mut self, creator: Arc<dyn StorageCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn customizer(mut self, customizer: StorageCustomizer) -> Self {
        self.customizer = Some(customizer);
        self
    }
}

impl fmt::Debug for StorageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSpec")
            .field("path", &self.path)
            .field("roaming", &self.roaming)
            .field("class", &self.class)
            .field("splitter", &self.splitter.as_ref().map(|s| s.name().to_string()))
            .field("exclusive", &self.exclusive)
            .field("creator", &self.creator.as_ref().map(|c| c.key()))
            .finish()
    }
}

/// Outcome of [`StateStorageManager::save_all`]
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Specs that wrote something, with what they wrote
    pub saved: Vec<(String, SaveOutcome)>,
    /// Number of storages with nothing to save
    pub unchanged: usize,
    pub failures: Vec<(String, Error)>,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builder for [`StateStorageManager`]
pub struct StateStorageManagerBuilder {
    name: String,
    macros: Vec<Macro>,
    headless: bool,
    default_format: ConfigFormat,
    providers_enabled: bool,
    tracker: Option<Arc<dyn ChangeTracker>>,
    hooks: Option<Arc<dyn StorageHooks>>,
    substitutor: Option<Arc<dyn PathMacroSubstitutor>>,
    registry: CustomStorageRegistry,
    providers: Vec<Arc<dyn StreamProvider>>,
}

impl Default for StateStorageManagerBuilder {
    fn default() -> Self {
        Self {
            name: "StateStorageManager".to_string(),
            macros: Vec::new(),
            headless: false,
            default_format: ConfigFormat::Json,
            providers_enabled: true,
            tracker: None,
            hooks: None,
            substitutor: None,
            registry: CustomStorageRegistry::new(),
            providers: Vec::new(),
        }
    }
}

impl StateStorageManagerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Apply headless mode, macros, default format and provider switch from `settings`
    pub fn settings(mut self, settings: &ManagerSettings) -> Self {
        self.headless = settings.headless;
        self.macros = settings.macros.clone();
        self.default_format = settings.default_format;
        self.providers_enabled = settings.stream_providers_enabled;
        self
    }

    pub fn macros(mut self, macros: Vec<Macro>) -> Self {
        self.macros = macros;
        self
    }

    pub fn add_macro(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.push(Macro::new(key, value));
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn default_format(mut self, format: ConfigFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Share a change tracker, possibly with other managers
    pub fn tracker(mut self, tracker: Arc<dyn ChangeTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn StorageHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn substitutor(mut self, substitutor: Arc<dyn PathMacroSubstitutor>) -> Self {
        self.substitutor = Some(substitutor);
        self
    }

    /// Replace the custom storage registry wholesale
    pub fn registry(mut self, registry: CustomStorageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a custom storage type under `class`
    pub fn register_custom_storage(mut self, class: impl Into<String>, factory: CustomStorageFactory) -> Result<Self> {
        self.registry.register(class, factory)?;
        Ok(self)
    }

    pub fn stream_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Result<StateStorageManager> {
        let macros = Arc::new(SharedMacroTable::new(MacroTable::new(self.macros)?));
        let stream_provider = Arc::new(CompoundStreamProvider::new());
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(InMemoryChangeTracker::new()));
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(DefaultStorageHooks));
        let substitutor = self
            .substitutor
            .unwrap_or_else(|| Arc::new(MacroTableSubstitutor::new(macros.clone())));

        let factory = StorageFactory::new(
            macros.clone(),
            stream_provider.clone(),
            tracker.clone(),
            self.registry,
            hooks,
            substitutor,
            self.headless,
            self.default_format,
        );

        let manager = StateStorageManager {
            name: self.name,
            cache: StorageCache::new(),
            factory,
            macros,
            stream_provider,
            tracker,
            providers_enabled: self.providers_enabled,
        };
        for provider in self.providers {
            manager.add_stream_provider(provider, false);
        }
        log::debug!("Built {:?}", manager);
        Ok(manager)
    }
}

/// Keyed, lazily-materialized state storage manager
pub struct StateStorageManager {
    name: String,
    cache: StorageCache,
    factory: StorageFactory,
    macros: Arc<SharedMacroTable>,
    stream_provider: Arc<CompoundStreamProvider>,
    tracker: Arc<dyn ChangeTracker>,
    providers_enabled: bool,
}

impl fmt::Debug for StateStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStorageManager")
            .field("name", &self.name)
            .field("macros", &self.macros.snapshot().len())
            .field("cached", &self.cache.len())
            .field("providers", &self.stream_provider.len())
            .field("factory", &self.factory)
            .finish()
    }
}

impl StateStorageManager {
    pub fn builder() -> StateStorageManagerBuilder {
        StateStorageManagerBuilder::default()
    }

    /// Manager configured from `settings` with default collaborators
    pub fn new(settings: &ManagerSettings) -> Result<Self> {
        Self::builder().settings(settings).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // --- macros ---

    pub fn macros(&self) -> Arc<MacroTable> {
        self.macros.snapshot()
    }

    /// Replace the macro table, returning the previous entries.
    ///
    /// Cached storages keep the paths they were built with.
    pub fn set_macros(&self, macros: Vec<Macro>) -> Result<Vec<Macro>> {
        Ok(self.macros.set_macros(macros)?)
    }

    pub fn expand_macro(&self, spec: &str) -> Result<PathBuf> {
        Ok(self.macros.expand(spec)?)
    }

    pub fn collapse_macro(&self, path: &str) -> String {
        self.macros.collapse(path)
    }

    // --- storages ---

    /// Return the storage for `spec`, building it on first request
    pub fn get_or_create_storage(&self, spec: &StorageSpec) -> Result<Arc<dyn StateStorage>> {
        let normalized = normalize_spec(&spec.path);
        let key = compute_storage_key(&spec.class, &normalized, &spec.path, spec.creator.as_deref())?;
        let request = StorageRequest {
            spec: &normalized,
            class: &spec.class,
            roaming: spec.roaming,
            splitter: spec.splitter.clone(),
            exclusive: spec.exclusive,
        };

        self.cache.get_or_create(
            &key,
            || match &spec.creator {
                Some(creator) if spec.class.is_default() => self.factory.create_with_creator(creator.as_ref(), &request),
                _ => self.factory.create(&request),
            },
            spec.customizer.as_ref(),
        )
    }

    /// Single-file storage for `path` with default options
    pub fn storage(&self, path: &str) -> Result<Arc<dyn StateStorage>> {
        self.get_or_create_storage(&StorageSpec::new(path))
    }

    /// Cached storage under `key`, a spec or a custom class tag
    pub fn get_cached_storage(&self, key: &str) -> Option<Arc<dyn StateStorage>> {
        self.cache
            .get(key)
            .or_else(|| self.cache.get(&normalize_spec(key)))
    }

    pub fn cached_storages(&self) -> Vec<Arc<dyn StateStorage>> {
        self.cache.snapshot()
    }

    /// Cached single-file storages for `specs`.
    ///
    /// Without a `normalizer`, specs are normalized the way cache keys are.
    pub fn cached_file_storages(
        &self,
        specs: &[String],
        normalizer: Option<&dyn Fn(&str) -> String>,
    ) -> Vec<Arc<dyn StateStorage>> {
        let default_normalizer = |spec: &str| normalize_spec(spec);
        let normalizer = normalizer.unwrap_or(&default_normalizer);
        self.cache.file_storages_matching(specs, Some(normalizer))
    }

    /// Drop every cached storage and deregister it from the change tracker.
    ///
    /// The cache is empty afterwards even when deregistration fails.
    pub fn clear_storages(&self) -> Result<()> {
        let failures = self.cache.clear(|key, storage| match storage.as_tracked() {
            Some(tracked) => self.tracker.remove(&tracked.tracked_path()).map_err(|e| {
                Error::from(StorageSystemError::OperationFailed {
                    storage: key.to_string(),
                    operation: "deregister".to_string(),
                    message: e.to_string(),
                })
            }),
            None => Ok(()),
        });
        if failures.is_empty() {
            log::debug!("{}: cleared storages", self.name);
            return Ok(());
        }

        let failures: Vec<StorageSystemError> = failures
            .into_iter()
            .map(|e| {
                log::warn!("{}: {}", self.name, e);
                match e {
                    Error::StorageSystem(inner) => inner,
                    other => StorageSystemError::OperationFailed {
                        storage: self.name.clone(),
                        operation: "deregister".to_string(),
                        message: other.to_string(),
                    },
                }
            })
            .collect();
        Err(StorageSystemError::DeregistrationFailed { failures }.into())
    }

    /// Move the backing file or directory of a cached storage to `new_file_name`
    /// in the same directory. The storage stays cached under its original key.
    pub fn rename_storage(&self, spec: &str, new_file_name: &str) -> Result<PathBuf> {
        let storage = self
            .get_cached_storage(spec)
            .ok_or_else(|| StorageSystemError::StorageNotFound(spec.to_string()))?;
        let tracked = storage.as_tracked().ok_or_else(|| StorageSystemError::OperationFailed {
            storage: spec.to_string(),
            operation: "rename".to_string(),
            message: "storage has no backing path".to_string(),
        })?;

        let old_path = tracked.tracked_path();
        if new_file_name.is_empty() || new_file_name.contains('/') || new_file_name.contains('\\') {
            return Err(StorageSystemError::InvalidPath {
                path: PathBuf::from(new_file_name),
                reason: "expected a bare file name".to_string(),
            }
            .into());
        }
        let new_path = old_path.with_file_name(new_file_name);

        if old_path.exists() {
            fs::rename(&old_path, &new_path).map_err(|e| Error::io(e, "rename", old_path.clone()))?;
        }

        let was_tracked = self.tracker.contains(&old_path);
        if was_tracked {
            self.tracker.remove(&old_path)?;
        }
        tracked.set_tracked_path(new_path.clone())?;
        if was_tracked {
            self.tracker.put(new_path.clone(), storage.clone())?;
        }
        log::debug!("Renamed storage '{}' to {}", spec, new_path.display());
        Ok(new_path)
    }

    /// Save every cached storage. Failures are collected, not propagated.
    pub fn save_all(&self) -> SaveReport {
        let mut storages = self.cache.snapshot();
        storages.sort_by(|a, b| a.spec().cmp(b.spec()));

        let mut report = SaveReport::default();
        for storage in storages {
            match storage.save() {
                Ok(SaveOutcome::Unchanged) => report.unchanged += 1,
                Ok(outcome) => report.saved.push((storage.spec().to_string(), outcome)),
                Err(e) => {
                    log::warn!("Failed to save storage '{}': {}", storage.spec(), e);
                    report.failures.push((storage.spec().to_string(), e));
                }
            }
        }
        log::debug!(
            "{}: saved {} storage(s), {} unchanged, {} failed",
            self.name,
            report.saved.len(),
            report.unchanged,
            report.failures.len()
        );
        report
    }

    /// Forward a provider data change to the cached storage for `spec`.
    /// Returns whether a storage received it.
    pub fn provider_data_state_changed(&self, spec: &str, change: ProviderDataChange) -> bool {
        match self.get_cached_storage(spec) {
            Some(storage) => match storage.as_tracked() {
                Some(tracked) => {
                    tracked.provider_data_state_changed(change);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Route an external change of `path` through the change tracker. Storages that
    /// were never registered do not receive it.
    pub fn notify_external_change(&self, path: &Path) -> Result<bool> {
        self.tracker.notify_changed(path)
    }

    pub fn vfs_listener_state(&self) -> VfsListenerState {
        self.factory.vfs_listener_state()
    }

    pub fn tracker(&self) -> &Arc<dyn ChangeTracker> {
        &self.tracker
    }

    // --- stream providers ---

    pub fn add_stream_provider(&self, provider: Arc<dyn StreamProvider>, first: bool) {
        if !self.providers_enabled {
            log::debug!("{}: stream providers disabled, ignoring '{}'", self.name, provider.name());
            return;
        }
        log::debug!("{}: adding stream provider '{}'", self.name, provider.name());
        self.stream_provider.add_provider(provider, first);
    }

    /// Remove every provider named `name`, returning how many were removed
    pub fn remove_stream_providers(&self, name: &str) -> usize {
        self.stream_provider.remove_providers_named(name)
    }

    pub fn stream_provider(&self) -> &Arc<CompoundStreamProvider> {
        &self.stream_provider
    }

    pub fn is_export_blocked(&self) -> bool {
        self.stream_provider.is_export_blocked()
    }

    pub fn effective_roaming_type(&self, requested: RoamingType, spec: &str) -> RoamingType {
        effective_roaming_type(requested, &normalize_spec(spec))
    }

    pub fn custom_storage_classes(&self) -> Vec<String> {
        self.factory.registry().classes()
    }
}
