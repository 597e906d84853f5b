//! Decides which kind of storage a request gets and builds it.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::kernel::error::{Error, Result};
use crate::storage::config::ConfigFormat;
use crate::storage::directory::DirectoryStorage;
use crate::storage::error::StorageSystemError;
use crate::storage::file::{FileStorage, StorageParams};
use crate::storage::key::StorageClass;
use crate::storage::macros::SharedMacroTable;
use crate::storage::registry::CustomStorageRegistry;
use crate::storage::roaming::{effective_roaming_type, RoamingType, VfsListenerState};
use crate::storage::state::{PathMacroSubstitutor, StateSplitter, StateStorage, StorageCreator, StorageHooks};
use crate::storage::stream::{CompoundStreamProvider, StreamProvider};
use crate::storage::tracker::ChangeTracker;
use crate::utils::has_extension;

/// A normalized storage request
#[derive(Clone)]
pub struct StorageRequest<'a> {
    pub spec: &'a str,
    pub class: &'a StorageClass,
    pub roaming: RoamingType,
    pub splitter: Option<Arc<dyn StateSplitter>>,
    pub exclusive: bool,
}

/// What custom factories and creators get to build a storage with.
///
/// It exposes the manager's collaborators but not its cache, so construction cannot
/// re-enter the cache while the write lock is held.
pub struct CreationContext<'a> {
    pub spec: &'a str,
    pub class: &'a StorageClass,
    pub roaming: RoamingType,
    pub exclusive: bool,
    pub macros: &'a Arc<SharedMacroTable>,
    pub stream_provider: &'a Arc<CompoundStreamProvider>,
    pub hooks: &'a Arc<dyn StorageHooks>,
    pub substitutor: &'a Arc<dyn PathMacroSubstitutor>,
    pub headless: bool,
    pub default_format: ConfigFormat,
}

impl CreationContext<'_> {
    /// Expand a spec with the manager's macros
    pub fn expand(&self, spec: &str) -> Result<PathBuf> {
        Ok(self.macros.expand(spec)?)
    }

    /// Parameters a file or directory storage would get for this request
    pub fn storage_params(&self) -> StorageParams {
        StorageParams {
            roaming: self.roaming,
            exclusive: self.exclusive,
            provider: if self.roaming.is_roamable() {
                Some(self.stream_provider.clone() as Arc<dyn StreamProvider>)
            } else {
                None
            },
            substitutor: Some(self.substitutor.clone()),
            hooks: self.hooks.clone(),
            default_format: self.default_format,
        }
    }
}

/// Builds storages for a manager and registers them with its change tracker
pub struct StorageFactory {
    macros: Arc<SharedMacroTable>,
    stream_provider: Arc<CompoundStreamProvider>,
    tracker: Arc<dyn ChangeTracker>,
    registry: CustomStorageRegistry,
    hooks: Arc<dyn StorageHooks>,
    substitutor: Arc<dyn PathMacroSubstitutor>,
    headless: bool,
    default_format: ConfigFormat,
    vfs_listener: Mutex<VfsListenerState>,
}

impl fmt::Debug for StorageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFactory")
            .field("registry", &self.registry)
            .field("headless", &self.headless)
            .field("vfs_listener", &*self.vfs_listener.lock())
            .finish()
    }
}

impl StorageFactory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        macros: Arc<SharedMacroTable>,
        stream_provider: Arc<CompoundStreamProvider>,
        tracker: Arc<dyn ChangeTracker>,
        registry: CustomStorageRegistry,
        hooks: Arc<dyn StorageHooks>,
        substitutor: Arc<dyn PathMacroSubstitutor>,
        headless: bool,
        default_format: ConfigFormat,
    ) -> Self {
        Self {
            macros,
            stream_provider,
            tracker,
            registry,
            hooks,
            substitutor,
            headless,
            default_format,
            vfs_listener: Mutex::new(VfsListenerState::Unknown),
        }
    }

    pub fn registry(&self) -> &CustomStorageRegistry {
        &self.registry
    }

    pub fn vfs_listener_state(&self) -> VfsListenerState {
        *self.vfs_listener.lock()
    }

    fn context<'a>(&'a self, request: &StorageRequest<'a>, roaming: RoamingType) -> CreationContext<'a> {
        CreationContext {
            spec: request.spec,
            class: request.class,
            roaming,
            exclusive: request.exclusive,
            macros: &self.macros,
            stream_provider: &self.stream_provider,
            hooks: &self.hooks,
            substitutor: &self.substitutor,
            headless: self.headless,
            default_format: self.default_format,
        }
    }

    /// Build the storage for `request`
    pub fn create(&self, request: &StorageRequest<'_>) -> Result<Arc<dyn StateStorage>> {
        match request.class {
            StorageClass::Custom(class) => self.create_custom(class, request),
            StorageClass::Default => self.create_default(request),
        }
    }

    /// Build a storage through a caller-supplied creator
    pub fn create_with_creator(
        &self,
        creator: &dyn StorageCreator,
        request: &StorageRequest<'_>,
    ) -> Result<Arc<dyn StateStorage>> {
        let roaming = effective_roaming_type(request.roaming, request.spec);
        let storage = creator.create(&self.context(request, roaming))?;
        if let Some(tracked) = storage.as_tracked() {
            self.tracker.put(tracked.tracked_path(), storage.clone())?;
        }
        Ok(storage)
    }

    fn create_custom(&self, class: &str, request: &StorageRequest<'_>) -> Result<Arc<dyn StateStorage>> {
        let factory = self.registry.get(class).ok_or_else(|| StorageSystemError::StorageConstructionFailure {
            class: class.to_string(),
            reason: "no factory registered for this class".to_string(),
        })?;
        let roaming = effective_roaming_type(request.roaming, request.spec);
        log::debug!("Creating custom storage '{}' for '{}'", class, request.spec);
        factory(&self.context(request, roaming)).map_err(|e| {
            Error::from(StorageSystemError::StorageConstructionFailure {
                class: class.to_string(),
                reason: e.to_string(),
            })
        })
    }

    fn create_default(&self, request: &StorageRequest<'_>) -> Result<Arc<dyn StateStorage>> {
        let roaming = effective_roaming_type(request.roaming, request.spec);
        let listener = self.resolve_vfs_listener();
        let path = self.macros.expand(request.spec)?;
        let context = self.context(request, roaming);

        if let Some(splitter) = &request.splitter {
            let mut params = context.storage_params();
            params.provider = None;
            let storage: Arc<dyn StateStorage> = Arc::new(DirectoryStorage::new(
                request.spec,
                path.clone(),
                splitter.clone(),
                params,
            ));
            self.tracker.put(path, storage.clone())?;
            return Ok(storage);
        }

        if !self.headless && !has_extension(&path) {
            return Err(StorageSystemError::MissingExtension(path).into());
        }

        if !roaming.is_roamable() {
            self.delete_remote_copy(request.spec);
        }

        let storage: Arc<dyn StateStorage> = Arc::new(FileStorage::new(
            request.spec,
            path.clone(),
            context.storage_params(),
        ));
        if listener == VfsListenerState::Enabled || !roaming.is_roamable() {
            self.tracker.put(path, storage.clone())?;
        }
        Ok(storage)
    }

    /// Decided on the first default storage, fixed afterwards. Callers hold the cache
    /// write lock, which makes this the only writer.
    fn resolve_vfs_listener(&self) -> VfsListenerState {
        let mut state = self.vfs_listener.lock();
        if *state == VfsListenerState::Unknown {
            *state = if self.stream_provider.is_exclusive() {
                VfsListenerState::Disabled
            } else {
                VfsListenerState::Enabled
            };
            log::debug!("Change tracking for file storages resolved to {:?}", *state);
        }
        *state
    }

    /// Local-only specs must not keep a stale copy in any provider. The fan-out asks
    /// with the default roaming type so providers that skip disabled specs are reached.
    fn delete_remote_copy(&self, spec: &str) {
        if self.stream_provider.is_empty() {
            return;
        }
        match self.stream_provider.delete(spec, RoamingType::Default) {
            Ok(true) => log::debug!("Deleted provider copy of local-only spec '{}'", spec),
            Ok(false) => {}
            Err(Error::StorageSystem(StorageSystemError::ProviderFailures(failures))) => {
                for failure in failures {
                    log::warn!("{}", failure);
                }
            }
            Err(e) => log::warn!("{}", e),
        }
    }
}
