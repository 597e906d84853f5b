//! In-memory custom storage for state that only lives as long as the process.
//!
//! Register it on a manager builder and request it by class tag:
//!
//! ```ignore
//! let mut registry = CustomStorageRegistry::new();
//! session_storage::register(&mut registry)?;
//! let manager = StateStorageManager::builder().registry(registry).build()?;
//! let session = manager.get_or_create_storage(
//!     &StorageSpec::new("session.xml").custom_class(SESSION_STORAGE_CLASS),
//! )?;
//! ```
use std::sync::Arc;

use confstate_core::kernel::error::Result as KernelResult;
use confstate_core::storage::{
    ComponentStates, ConfigData, CreationContext, CustomStorageRegistry, SaveOutcome, StateStorage,
    StorageSystemError,
};
use log::debug;
use parking_lot::Mutex;

/// Class tag the session storage is registered under
pub const SESSION_STORAGE_CLASS: &str = "confstate.session.SessionStorage";

#[derive(Debug, Default)]
struct SessionState {
    working: ComponentStates,
    committed: ComponentStates,
    dirty: bool,
}

/// Storage keeping component state in memory.
///
/// `save` commits the working state; `rollback` returns to the last commit.
#[derive(Debug)]
pub struct SessionStorage {
    spec: String,
    state: Mutex<SessionState>,
}

impl SessionStorage {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Discard changes made since the last save
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        state.working = state.committed.clone();
        state.dirty = false;
    }

    /// Build a session storage for a manager request
    pub fn create(context: &CreationContext<'_>) -> KernelResult<Arc<dyn StateStorage>> {
        debug!("Creating session storage for '{}'", context.spec);
        Ok(Arc::new(Self::new(context.spec)))
    }
}

impl StateStorage for SessionStorage {
    fn spec(&self) -> &str {
        &self.spec
    }

    fn get_state(&self, component: &str) -> KernelResult<Option<ConfigData>> {
        Ok(self.state.lock().working.get(component).cloned())
    }

    fn set_state(&self, component: &str, data: ConfigData) -> KernelResult<()> {
        let mut state = self.state.lock();
        if state.working.get(component) != Some(&data) {
            state.working.insert(component.to_string(), data);
            state.dirty = true;
        }
        Ok(())
    }

    fn remove_state(&self, component: &str) -> KernelResult<Option<ConfigData>> {
        let mut state = self.state.lock();
        let removed = state.working.remove(component);
        if removed.is_some() {
            state.dirty = true;
        }
        Ok(removed)
    }

    fn component_names(&self) -> KernelResult<Vec<String>> {
        Ok(self.state.lock().working.keys().cloned().collect())
    }

    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn save(&self) -> KernelResult<SaveOutcome> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(SaveOutcome::Unchanged);
        }
        state.committed = state.working.clone();
        state.dirty = false;
        debug!("Committed session storage '{}'", self.spec);
        Ok(SaveOutcome::Local)
    }
}

/// Register [`SessionStorage`] under [`SESSION_STORAGE_CLASS`]
pub fn register(registry: &mut CustomStorageRegistry) -> Result<(), StorageSystemError> {
    registry.register_fn(SESSION_STORAGE_CLASS, SessionStorage::create)
}
