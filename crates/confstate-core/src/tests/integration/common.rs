use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::kernel::constants::{APP_CONFIG_MACRO, ROOT_CONFIG_MACRO};
use crate::kernel::error::Result;
use crate::storage::config::ConfigData;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::CreationContext;
use crate::storage::macros::Macro;
use crate::storage::manager::{StateStorageManager, StateStorageManagerBuilder};
use crate::storage::state::{SaveOutcome, StateStorage, StorageCreator};

/// Temp root plus a manager whose `$ROOT_CONFIG$` points at it
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub manager: StateStorageManager,
}

impl TestEnvironment {
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }
}

pub fn root_macros(root: &std::path::Path) -> Vec<Macro> {
    vec![
        Macro::from_path(ROOT_CONFIG_MACRO, root),
        Macro::new(APP_CONFIG_MACRO, format!("{}/options", ROOT_CONFIG_MACRO)),
    ]
}

pub fn builder_for(temp_dir: &TempDir) -> StateStorageManagerBuilder {
    StateStorageManager::builder().macros(root_macros(temp_dir.path()))
}

pub fn setup_test_environment() -> TestEnvironment {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir).build().expect("Failed to build manager");
    TestEnvironment { temp_dir, manager }
}

pub fn component(key: &str, value: impl serde::Serialize) -> ConfigData {
    let mut data = ConfigData::new();
    data.set(key, value).expect("Failed to set value");
    data
}

/// In-memory storage used for custom classes and creators
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub spec: String,
    pub states: Mutex<BTreeMap<String, ConfigData>>,
    pub fail_save: bool,
}

impl MemoryStorage {
    pub fn new(spec: &str) -> Self {
        Self {
            spec: spec.to_string(),
            ..Self::default()
        }
    }
}

impl StateStorage for MemoryStorage {
    fn spec(&self) -> &str {
        &self.spec
    }

    fn get_state(&self, component: &str) -> Result<Option<ConfigData>> {
        Ok(self.states.lock().get(component).cloned())
    }

    fn set_state(&self, component: &str, state: ConfigData) -> Result<()> {
        self.states.lock().insert(component.to_string(), state);
        Ok(())
    }

    fn remove_state(&self, component: &str) -> Result<Option<ConfigData>> {
        Ok(self.states.lock().remove(component))
    }

    fn component_names(&self) -> Result<Vec<String>> {
        Ok(self.states.lock().keys().cloned().collect())
    }

    fn is_dirty(&self) -> bool {
        false
    }

    fn save(&self) -> Result<SaveOutcome> {
        if self.fail_save {
            return Err(StorageSystemError::OperationFailed {
                storage: self.spec.clone(),
                operation: "save".to_string(),
                message: "read-only backend".to_string(),
            }
            .into());
        }
        Ok(SaveOutcome::Unchanged)
    }
}

/// Creator counting how often it builds
pub struct CountingCreator {
    pub key: String,
    pub built: Arc<AtomicUsize>,
    pub delay_ms: u64,
}

impl StorageCreator for CountingCreator {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn create(&self, context: &CreationContext<'_>) -> Result<Arc<dyn StateStorage>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
        }
        Ok(Arc::new(MemoryStorage::new(context.spec)))
    }
}
