//! Single-file storage.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::kernel::error::{Error, Result};
use crate::storage::config::{ConfigData, ConfigFormat};
use crate::storage::error::StorageSystemError;
use crate::storage::roaming::RoamingType;
use crate::storage::state::{
    ComponentStates, DefaultStorageHooks, PathMacroSubstitutor, ProviderDataChange, SaveOutcome,
    StateStorage, StorageAttributes, StorageHooks, TrackedStorage,
};
use crate::storage::stream::StreamProvider;
use crate::utils::fs::{read_to_string_if_exists, remove_file_if_exists, write_atomic};

/// Collaborators and policy handed to a storage at construction
#[derive(Clone)]
pub struct StorageParams {
    pub roaming: RoamingType,
    /// Exclusive storages ignore external change notifications
    pub exclusive: bool,
    /// `None` when roaming is disabled
    pub provider: Option<Arc<dyn StreamProvider>>,
    pub substitutor: Option<Arc<dyn PathMacroSubstitutor>>,
    pub hooks: Arc<dyn StorageHooks>,
    /// Format for files whose extension names none
    pub default_format: ConfigFormat,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            roaming: RoamingType::Default,
            exclusive: false,
            provider: None,
            substitutor: None,
            hooks: Arc::new(DefaultStorageHooks),
            default_format: ConfigFormat::Json,
        }
    }
}

impl fmt::Debug for StorageParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageParams")
            .field("roaming", &self.roaming)
            .field("exclusive", &self.exclusive)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("default_format", &self.default_format)
            .finish()
    }
}

/// On-disk document
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageDocument {
    #[serde(default)]
    attributes: StorageAttributes,
    #[serde(default)]
    components: ComponentStates,
}

#[derive(Debug, Default)]
struct LoadedState {
    components: Option<ComponentStates>,
    attributes: StorageAttributes,
    dirty: bool,
}

/// Storage backed by one file, optionally overridden by a stream provider
pub struct FileStorage {
    spec: String,
    path: RwLock<PathBuf>,
    format: ConfigFormat,
    params: StorageParams,
    state: Mutex<LoadedState>,
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("spec", &self.spec)
            .field("path", &*self.path.read())
            .field("format", &self.format)
            .field("params", &self.params)
            .finish()
    }
}

impl FileStorage {
    pub fn new(spec: impl Into<String>, path: PathBuf, params: StorageParams) -> Self {
        let format = ConfigFormat::for_storage_file(&path, params.default_format);
        Self {
            spec: spec.into(),
            path: RwLock::new(path),
            format,
            params,
            state: Mutex::new(LoadedState::default()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    pub fn roaming_type(&self) -> RoamingType {
        self.params.roaming
    }

    pub fn has_provider(&self) -> bool {
        self.params.provider.is_some()
    }

    /// Whether content has been loaded since construction or the last invalidation
    pub fn is_loaded(&self) -> bool {
        self.state.lock().components.is_some()
    }

    /// Document attributes, loading lazily
    pub fn attributes(&self) -> Result<StorageAttributes> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        Ok(state.attributes.clone())
    }

    fn provider_for_spec(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.params
            .provider
            .as_ref()
            .filter(|p| p.enabled() && p.is_applicable(&self.spec, self.params.roaming))
    }

    fn ensure_loaded<'a>(&self, state: &'a mut LoadedState) -> Result<&'a mut ComponentStates> {
        if state.components.is_none() {
            let document = self.read_document()?;
            let mut components = document.components;
            for data in components.values_mut() {
                if let Some(substitutor) = &self.params.substitutor {
                    data.map_strings(&|s| substitutor.expand_text(s));
                }
                self.params.hooks.before_element_loaded(data);
            }
            state.attributes = document.attributes;
            state.components = Some(components);
            state.dirty = false;
        }
        Ok(state.components.get_or_insert_with(ComponentStates::new))
    }

    fn read_document(&self) -> Result<StorageDocument> {
        if let Some(provider) = self.provider_for_spec() {
            if let Some(bytes) = provider.read(&self.spec, self.params.roaming)? {
                log::debug!("Loaded '{}' from stream provider '{}'", self.spec, provider.name());
                let content = String::from_utf8(bytes).map_err(|e| {
                    Error::from(StorageSystemError::DeserializationError {
                        format: "UTF-8".to_string(),
                        source: Box::new(e),
                    })
                })?;
                return self.parse(&content);
            }
        }

        let path = self.path();
        match read_to_string_if_exists(&path)? {
            Some(content) => self.parse(&content),
            None => Ok(StorageDocument::default()),
        }
    }

    fn parse(&self, content: &str) -> Result<StorageDocument> {
        if content.trim().is_empty() {
            return Ok(StorageDocument::default());
        }
        self.format.deserialize(content)
    }

    /// Drop loaded content so the next access reads again. Unsaved changes are lost.
    fn invalidate(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.dirty {
            log::warn!("Discarding unsaved changes of '{}': {}", self.spec, reason);
        }
        state.components = None;
        state.dirty = false;
    }
}

impl StateStorage for FileStorage {
    fn spec(&self) -> &str {
        &self.spec
    }

    fn get_state(&self, component: &str) -> Result<Option<ConfigData>> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        Ok(components.get(component).cloned())
    }

    fn set_state(&self, component: &str, data: ConfigData) -> Result<()> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        if components.get(component) == Some(&data) {
            return Ok(());
        }
        components.insert(component.to_string(), data);
        state.dirty = true;
        Ok(())
    }

    fn remove_state(&self, component: &str) -> Result<Option<ConfigData>> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        let removed = components.remove(component);
        if removed.is_some() {
            state.dirty = true;
        }
        Ok(removed)
    }

    fn component_names(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        Ok(components.keys().cloned().collect())
    }

    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn save(&self) -> Result<SaveOutcome> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(SaveOutcome::Unchanged);
        }

        let mut components = state.components.clone().unwrap_or_default();
        let mut attributes = state.attributes.clone();
        self.params.hooks.before_element_saved(&mut components, &mut attributes);
        if let Some(substitutor) = &self.params.substitutor {
            for data in components.values_mut() {
                data.map_strings(&|s| substitutor.collapse_text(s));
            }
        }

        let path = self.path();
        let provider = self.provider_for_spec();
        let provider_only = provider.is_some_and(|p| p.is_exclusive());

        let outcome = if components.is_empty() {
            if let Some(provider) = provider {
                provider.delete(&self.spec, self.params.roaming)?;
            }
            if !provider_only {
                remove_file_if_exists(&path)?;
            }
            SaveOutcome::Local
        } else {
            let content = self.format.serialize(&StorageDocument { attributes, components })?;
            if let Some(provider) = provider {
                provider.write(&self.spec, content.as_bytes(), self.params.roaming)?;
            }
            if !provider_only {
                write_atomic(&path, content.as_bytes())?;
            }
            match (provider.is_some(), provider_only) {
                (true, true) => SaveOutcome::Provider,
                (true, false) => SaveOutcome::LocalAndProvider,
                _ => SaveOutcome::Local,
            }
        };

        log::debug!("Saved '{}' ({:?})", self.spec, outcome);
        state.dirty = false;
        Ok(outcome)
    }

    fn handle_external_change(&self, path: &Path) -> Result<()> {
        if self.params.exclusive {
            log::debug!("Ignoring external change of exclusive storage '{}'", self.spec);
            return Ok(());
        }
        self.invalidate(&format!("{} changed on disk", path.display()));
        Ok(())
    }

    fn as_tracked(&self) -> Option<&dyn TrackedStorage> {
        Some(self)
    }

    fn file_path(&self) -> Option<PathBuf> {
        Some(self.path())
    }
}

impl TrackedStorage for FileStorage {
    fn tracked_path(&self) -> PathBuf {
        self.path()
    }

    fn set_tracked_path(&self, path: PathBuf) -> Result<()> {
        *self.path.write() = path;
        Ok(())
    }

    fn provider_data_state_changed(&self, change: ProviderDataChange) {
        match change {
            ProviderDataChange::Loaded | ProviderDataChange::Reset => {
                self.invalidate("stream provider data changed");
            }
            ProviderDataChange::Saved => {}
        }
    }
}
