pub mod kernel;
pub mod storage;
pub mod utils;

// Re-export key public types for the binary and plugins
pub use kernel::error::{Error, Result};
pub use storage::{
    ConfigData, CustomStorageRegistry, Macro, ManagerSettings, RoamingType, StateStorage, StateStorageManager,
    StorageSpec, StorageSystemError,
};

#[cfg(test)]
mod tests;
