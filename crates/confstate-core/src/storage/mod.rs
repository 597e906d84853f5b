//! State storage: macro resolution, storage construction and caching.
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod factory;
pub mod file;
pub mod key;
pub mod macros;
pub mod manager;
pub mod registry;
pub mod roaming;
pub mod settings;
pub mod state;
pub mod stream;
pub mod tracker;

/// Re-export key types
pub use cache::StorageCache;
pub use config::{ConfigData, ConfigFormat};
pub use directory::{ComponentSplitter, DirectoryStorage, KeySplitter};
pub use error::StorageSystemError;
pub use factory::{CreationContext, StorageFactory, StorageRequest};
pub use file::{FileStorage, StorageParams};
pub use key::{compute_storage_key, normalize_spec, StorageClass};
pub use macros::{Macro, MacroTable, SharedMacroTable};
pub use manager::{SaveReport, StateStorageManager, StateStorageManagerBuilder, StorageSpec};
pub use registry::{CustomStorageFactory, CustomStorageRegistry};
pub use roaming::{effective_roaming_type, RoamingType, VfsListenerState};
pub use settings::ManagerSettings;
pub use state::{
    ComponentStates, DefaultStorageHooks, MacroTableSubstitutor, PathMacroSubstitutor, ProviderDataChange,
    SaveOutcome, StateSplitter, StateStorage, StorageAttributes, StorageCreator, StorageCustomizer, StorageHooks,
    TrackedStorage,
};
pub use stream::{CompoundStreamProvider, InMemoryStreamProvider, StreamProvider};
pub use tracker::{ChangeTracker, InMemoryChangeTracker};

#[cfg(test)]
mod tests;
