//! Stream providers: external backends that override or mirror storage files.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::roaming::RoamingType;

/// Trait for external backends that can hold a copy of a spec's content
pub trait StreamProvider: Send + Sync + Debug {
    /// Stable name, used to attribute failures and to remove providers
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    /// Exclusive providers replace local files for the specs they claim
    fn is_exclusive(&self) -> bool {
        false
    }

    /// Whether this provider handles `spec`
    fn is_applicable(&self, spec: &str, roaming: RoamingType) -> bool;

    /// Content for `spec`, if the provider has any
    fn read(&self, spec: &str, roaming: RoamingType) -> Result<Option<Vec<u8>>>;

    /// Store content for `spec`
    fn write(&self, spec: &str, content: &[u8], roaming: RoamingType) -> Result<()>;

    /// Delete content for `spec`; false if there was none
    fn delete(&self, spec: &str, roaming: RoamingType) -> Result<bool>;

    /// Whether exporting settings must be disabled while this provider is active
    fn is_export_blocked(&self) -> bool {
        false
    }
}

type ProviderList = Arc<Vec<Arc<dyn StreamProvider>>>;

/// Ordered provider chain presented as a single provider.
///
/// The list is copy-on-write: mutation swaps in a new snapshot, iteration never holds
/// the lock.
#[derive(Debug, Default)]
pub struct CompoundStreamProvider {
    providers: RwLock<ProviderList>,
}

impl CompoundStreamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current provider snapshot
    pub fn providers(&self) -> ProviderList {
        self.providers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Add a provider at the front or the end of the chain
    pub fn add_provider(&self, provider: Arc<dyn StreamProvider>, at_front: bool) {
        let mut guard = self.providers.write();
        let mut next: Vec<Arc<dyn StreamProvider>> = guard.as_ref().clone();
        log::debug!("Adding stream provider '{}' (front: {})", provider.name(), at_front);
        if at_front {
            next.insert(0, provider);
        } else {
            next.push(provider);
        }
        *guard = Arc::new(next);
    }

    /// Remove every provider with the given name, returning how many were removed
    pub fn remove_providers_named(&self, name: &str) -> usize {
        let mut guard = self.providers.write();
        let next: Vec<Arc<dyn StreamProvider>> = guard
            .iter()
            .filter(|p| p.name() != name)
            .cloned()
            .collect();
        let removed = guard.len() - next.len();
        *guard = Arc::new(next);
        removed
    }

    /// Whether an exclusive provider claims `spec`
    pub fn is_exclusive_for(&self, spec: &str, roaming: RoamingType) -> bool {
        self.applicable(spec, roaming).iter().any(|p| p.is_exclusive())
    }

    fn applicable(&self, spec: &str, roaming: RoamingType) -> Vec<Arc<dyn StreamProvider>> {
        self.providers()
            .iter()
            .filter(|p| p.enabled() && p.is_applicable(spec, roaming))
            .cloned()
            .collect()
    }
}

fn attribute(provider: &dyn StreamProvider, operation: &str, spec: &str, error: Error) -> StorageSystemError {
    StorageSystemError::provider(provider.name(), operation, spec, error.to_string())
}

fn aggregate(mut failures: Vec<StorageSystemError>) -> Error {
    if failures.len() == 1 {
        Error::from(failures.remove(0))
    } else {
        Error::from(StorageSystemError::ProviderFailures(failures))
    }
}

impl StreamProvider for CompoundStreamProvider {
    fn name(&self) -> &str {
        "compound"
    }

    fn enabled(&self) -> bool {
        self.providers().iter().any(|p| p.enabled())
    }

    fn is_exclusive(&self) -> bool {
        self.providers().iter().any(|p| p.enabled() && p.is_exclusive())
    }

    fn is_applicable(&self, spec: &str, roaming: RoamingType) -> bool {
        !self.applicable(spec, roaming).is_empty()
    }

    /// First applicable provider with content wins. Failures of skipped providers are
    /// logged; they only become the result when no provider had content.
    fn read(&self, spec: &str, roaming: RoamingType) -> Result<Option<Vec<u8>>> {
        let mut failures = Vec::new();
        for provider in self.applicable(spec, roaming) {
            match provider.read(spec, roaming) {
                Ok(Some(content)) => {
                    for failure in &failures {
                        log::warn!("{}", failure);
                    }
                    return Ok(Some(content));
                }
                Ok(None) => {}
                Err(e) => failures.push(attribute(provider.as_ref(), "read", spec, e)),
            }
        }
        if failures.is_empty() {
            Ok(None)
        } else {
            Err(aggregate(failures))
        }
    }

    fn write(&self, spec: &str, content: &[u8], roaming: RoamingType) -> Result<()> {
        let mut failures = Vec::new();
        for provider in self.applicable(spec, roaming) {
            if let Err(e) = provider.write(spec, content, roaming) {
                failures.push(attribute(provider.as_ref(), "write", spec, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(aggregate(failures))
        }
    }

    fn delete(&self, spec: &str, roaming: RoamingType) -> Result<bool> {
        let mut failures = Vec::new();
        let mut deleted = false;
        for provider in self.applicable(spec, roaming) {
            match provider.delete(spec, roaming) {
                Ok(d) => deleted |= d,
                Err(e) => failures.push(attribute(provider.as_ref(), "delete", spec, e)),
            }
        }
        if failures.is_empty() {
            Ok(deleted)
        } else {
            Err(aggregate(failures))
        }
    }

    fn is_export_blocked(&self) -> bool {
        self.providers().iter().any(|p| p.enabled() && p.is_export_blocked())
    }
}

/// Stream provider keeping content in memory, claiming specs by prefix
#[derive(Debug)]
pub struct InMemoryStreamProvider {
    name: String,
    prefixes: Vec<String>,
    exclusive: bool,
    export_blocked: bool,
    content: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStreamProvider {
    /// Provider claiming every spec
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefixes: Vec::new(),
            exclusive: false,
            export_blocked: false,
            content: Mutex::new(HashMap::new()),
        }
    }

    /// Only claim specs starting with `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn block_export(mut self, blocked: bool) -> Self {
        self.export_blocked = blocked;
        self
    }

    /// Seed or inspect content directly
    pub fn put(&self, spec: &str, content: impl Into<Vec<u8>>) {
        self.content.lock().insert(spec.to_string(), content.into());
    }

    pub fn get(&self, spec: &str) -> Option<Vec<u8>> {
        self.content.lock().get(spec).cloned()
    }

    pub fn contains(&self, spec: &str) -> bool {
        self.content.lock().contains_key(spec)
    }
}

impl StreamProvider for InMemoryStreamProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn is_applicable(&self, spec: &str, _roaming: RoamingType) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| spec.starts_with(p.as_str()))
    }

    fn read(&self, spec: &str, _roaming: RoamingType) -> Result<Option<Vec<u8>>> {
        Ok(self.get(spec))
    }

    fn write(&self, spec: &str, content: &[u8], _roaming: RoamingType) -> Result<()> {
        self.put(spec, content);
        Ok(())
    }

    fn delete(&self, spec: &str, _roaming: RoamingType) -> Result<bool> {
        Ok(self.content.lock().remove(spec).is_some())
    }

    fn is_export_blocked(&self) -> bool {
        self.export_blocked
    }
}
