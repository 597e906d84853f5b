use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::CreationContext;
use crate::storage::state::StateStorage;

/// Builds one custom storage type
pub type CustomStorageFactory =
    Arc<dyn Fn(&CreationContext<'_>) -> Result<Arc<dyn StateStorage>> + Send + Sync>;

/// Registry mapping custom storage class tags to their factories
#[derive(Clone, Default)]
pub struct CustomStorageRegistry {
    factories: HashMap<String, CustomStorageFactory>,
}

// Manual Debug implementation
impl fmt::Debug for CustomStorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStorageRegistry")
            .field("classes", &self.classes())
            .finish()
    }
}

impl CustomStorageRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for `class`
    pub fn register(&mut self, class: impl Into<String>, factory: CustomStorageFactory) -> std::result::Result<(), StorageSystemError> {
        let class = class.into();
        if self.factories.contains_key(&class) {
            return Err(StorageSystemError::CustomStorageAlreadyRegistered(class));
        }
        self.factories.insert(class, factory);
        Ok(())
    }

    /// Register a closure as the factory for `class`
    pub fn register_fn<F>(&mut self, class: impl Into<String>, factory: F) -> std::result::Result<(), StorageSystemError>
    where
        F: Fn(&CreationContext<'_>) -> Result<Arc<dyn StateStorage>> + Send + Sync + 'static,
    {
        self.register(class, Arc::new(factory))
    }

    pub fn get(&self, class: &str) -> Option<CustomStorageFactory> {
        self.factories.get(class).cloned()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class tags, sorted
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.factories.keys().cloned().collect();
        classes.sort();
        classes
    }

    pub fn count(&self) -> usize {
        self.factories.len()
    }
}
