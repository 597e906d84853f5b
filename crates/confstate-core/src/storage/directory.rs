//! Directory-split storage: one directory per spec, component state split across files.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::kernel::error::Result;
use crate::storage::config::{ConfigData, ConfigFormat};
use crate::storage::file::StorageParams;
use crate::storage::state::{
    ComponentStates, ProviderDataChange, SaveOutcome, StateSplitter, StateStorage, StorageAttributes,
    TrackedStorage,
};
use crate::utils::fs::{list_files_with_extension, read_to_string_if_exists, remove_file_if_exists, write_atomic};

/// One file of a directory storage
#[derive(Debug, Serialize, Deserialize)]
struct SplitPart {
    component: String,
    #[serde(default)]
    state: ConfigData,
}

#[derive(Debug, Default)]
struct DirectoryState {
    components: Option<ComponentStates>,
    /// Files currently on disk, per component
    files: BTreeMap<String, BTreeSet<String>>,
    dirty: BTreeSet<String>,
}

/// Storage keeping each split part of each component in its own file
pub struct DirectoryStorage {
    spec: String,
    dir: RwLock<PathBuf>,
    splitter: Arc<dyn StateSplitter>,
    params: StorageParams,
    state: Mutex<DirectoryState>,
}

impl fmt::Debug for DirectoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryStorage")
            .field("spec", &self.spec)
            .field("dir", &*self.dir.read())
            .field("splitter", &self.splitter.name())
            .finish()
    }
}

impl DirectoryStorage {
    pub fn new(spec: impl Into<String>, dir: PathBuf, splitter: Arc<dyn StateSplitter>, params: StorageParams) -> Self {
        Self {
            spec: spec.into(),
            dir: RwLock::new(dir),
            splitter,
            params,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.read().clone()
    }

    pub fn splitter_name(&self) -> &str {
        self.splitter.name()
    }

    fn ensure_loaded<'a>(&self, state: &'a mut DirectoryState) -> Result<&'a mut ComponentStates> {
        if state.components.is_none() {
            let dir = self.dir();
            let mut parts: BTreeMap<String, Vec<(String, ConfigData)>> = BTreeMap::new();
            let mut files: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

            for file in list_files_with_extension(&dir, ConfigFormat::Json.extension())? {
                let Some(content) = read_to_string_if_exists(&file)? else {
                    continue;
                };
                let part: SplitPart = ConfigFormat::Json.deserialize(&content)?;
                let file_name = file_name_of(&file);
                files.entry(part.component.clone()).or_default().insert(file_name.clone());
                parts.entry(part.component).or_default().push((file_name, part.state));
            }

            let mut components = ComponentStates::new();
            for (component, component_parts) in parts {
                let mut data = self.splitter.merge(&component, component_parts);
                if let Some(substitutor) = &self.params.substitutor {
                    data.map_strings(&|s| substitutor.expand_text(s));
                }
                self.params.hooks.before_element_loaded(&mut data);
                components.insert(component, data);
            }

            state.components = Some(components);
            state.files = files;
            state.dirty.clear();
        }
        Ok(state.components.get_or_insert_with(ComponentStates::new))
    }

    fn invalidate(&self) {
        let mut state = self.state.lock();
        if !state.dirty.is_empty() {
            log::warn!("Discarding unsaved changes of directory storage '{}'", self.spec);
        }
        state.components = None;
        state.dirty.clear();
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl StateStorage for DirectoryStorage {
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
        state.dirty.insert(component.to_string());
        Ok(())
    }

    fn remove_state(&self, component: &str) -> Result<Option<ConfigData>> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        let removed = components.remove(component);
        if removed.is_some() {
            state.dirty.insert(component.to_string());
        }
        Ok(removed)
    }

    fn component_names(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let components = self.ensure_loaded(&mut state)?;
        Ok(components.keys().cloned().collect())
    }

    fn is_dirty(&self) -> bool {
        !self.state.lock().dirty.is_empty()
    }

    fn save(&self) -> Result<SaveOutcome> {
        let mut state = self.state.lock();
        if state.dirty.is_empty() {
            return Ok(SaveOutcome::Unchanged);
        }

        let dir = self.dir();
        let dirty: Vec<String> = state.dirty.iter().cloned().collect();
        let mut changed = ComponentStates::new();
        for component in &dirty {
            if let Some(data) = state.components.as_ref().and_then(|c| c.get(component)) {
                changed.insert(component.clone(), data.clone());
            }
        }
        let mut attributes = StorageAttributes::new();
        self.params.hooks.before_element_saved(&mut changed, &mut attributes);

        for component in &dirty {
            let mut written = BTreeSet::new();
            if let Some(data) = changed.get_mut(component) {
                if let Some(substitutor) = &self.params.substitutor {
                    data.map_strings(&|s| substitutor.collapse_text(s));
                }
                for (file_name, part) in self.splitter.split(component, data) {
                    let content = ConfigFormat::Json.serialize(&SplitPart {
                        component: component.clone(),
                        state: part,
                    })?;
                    write_atomic(&dir.join(&file_name), content.as_bytes())?;
                    written.insert(file_name);
                }
            }

            let previous = state.files.remove(component).unwrap_or_default();
            for stale in previous.difference(&written) {
                remove_file_if_exists(&dir.join(stale))?;
            }
            if !written.is_empty() {
                state.files.insert(component.clone(), written);
            }
            state.dirty.remove(component);
        }

        log::debug!("Saved directory storage '{}' ({} component(s))", self.spec, dirty.len());
        Ok(SaveOutcome::Local)
    }

    fn handle_external_change(&self, _path: &Path) -> Result<()> {
        if self.params.exclusive {
            return Ok(());
        }
        self.invalidate();
        Ok(())
    }

    fn as_tracked(&self) -> Option<&dyn TrackedStorage> {
        Some(self)
    }
}

impl TrackedStorage for DirectoryStorage {
    fn tracked_path(&self) -> PathBuf {
        self.dir()
    }

    fn set_tracked_path(&self, path: PathBuf) -> Result<()> {
        *self.dir.write() = path;
        Ok(())
    }

    fn provider_data_state_changed(&self, change: ProviderDataChange) {
        if change != ProviderDataChange::Saved {
            self.invalidate();
        }
    }
}

/// Replaces characters that cannot appear in a file name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}

/// One file per component
#[derive(Debug, Default, Clone, Copy)]
pub struct ComponentSplitter;

impl StateSplitter for ComponentSplitter {
    fn name(&self) -> &str {
        "component"
    }

    fn split(&self, component: &str, state: &ConfigData) -> Vec<(String, ConfigData)> {
        vec![(format!("{}.json", sanitize(component)), state.clone())]
    }
}

/// One file per top-level key of a component's state
#[derive(Debug, Default, Clone, Copy)]
pub struct KeySplitter;

impl StateSplitter for KeySplitter {
    fn name(&self) -> &str {
        "key"
    }

    fn split(&self, component: &str, state: &ConfigData) -> Vec<(String, ConfigData)> {
        if state.is_empty() {
            return vec![(format!("{}.json", sanitize(component)), ConfigData::new())];
        }
        state
            .iter()
            .map(|(key, value)| {
                let mut map = BTreeMap::new();
                map.insert(key.clone(), value.clone());
                (format!("{}.{}.json", sanitize(component), sanitize(key)), ConfigData::from_map(map))
            })
            .collect()
    }
}
