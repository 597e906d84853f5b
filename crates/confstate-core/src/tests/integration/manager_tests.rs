#![cfg(test)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use super::common::{builder_for, setup_test_environment, CountingCreator, MemoryStorage};
use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::CreationContext;
use crate::storage::macros::Macro;
use crate::storage::manager::{StateStorageManager, StorageSpec};
use crate::storage::registry::CustomStorageFactory;
use crate::storage::roaming::{RoamingType, VfsListenerState};
use crate::storage::state::{StateStorage, StorageCustomizer};
use crate::storage::tracker::{ChangeTracker, InMemoryChangeTracker};

const CUSTOM_CLASS: &str = "confstate.tests.MemoryStorage";

fn memory_factory() -> CustomStorageFactory {
    fn build(context: &CreationContext<'_>) -> Result<Arc<dyn StateStorage>> {
        Ok(Arc::new(MemoryStorage::new(context.spec)))
    }
    Arc::new(build)
}

#[test]
fn test_expand_and_collapse_through_manager() -> Result<()> {
    let manager = StateStorageManager::builder()
        .add_macro("$APP_CONFIG$", "/home/u/.config/app")
        .build()?;

    assert_eq!(
        manager.expand_macro("$APP_CONFIG$/options/editor.xml")?,
        PathBuf::from("/home/u/.config/app/options/editor.xml")
    );
    assert_eq!(
        manager.collapse_macro("/home/u/.config/app/options/editor.xml"),
        "$APP_CONFIG$/options/editor.xml"
    );
    Ok(())
}

#[test]
fn test_same_spec_returns_same_instance() -> Result<()> {
    let env = setup_test_environment();
    let first = env.manager.storage("$APP_CONFIG$/editor.xml")?;
    let second = env.manager.storage("$APP_CONFIG$\\editor.xml\\")?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.manager.cached_storages().len(), 1);
    assert_eq!(first.file_path(), Some(env.root().join("options/editor.xml")));
    Ok(())
}

#[test]
fn test_custom_class_shares_one_instance() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir)
        .register_custom_storage(CUSTOM_CLASS, memory_factory())?
        .build()?;

    let first = manager.get_or_create_storage(&StorageSpec::new("foo.bar").custom_class(CUSTOM_CLASS))?;
    let second = manager.get_or_create_storage(&StorageSpec::new("other.bar").custom_class(CUSTOM_CLASS))?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.spec(), "foo.bar");
    assert!(manager.get_cached_storage(CUSTOM_CLASS).is_some());
    assert_eq!(manager.custom_storage_classes(), vec![CUSTOM_CLASS.to_string()]);
    Ok(())
}

#[test]
fn test_unknown_custom_class_fails() {
    let env = setup_test_environment();
    let err = env
        .manager
        .get_or_create_storage(&StorageSpec::new("a.xml").custom_class("nope.Storage"))
        .unwrap_err();
    assert!(matches!(
        err.as_storage(),
        Some(StorageSystemError::StorageConstructionFailure { .. })
    ));
    assert!(env.manager.cached_storages().is_empty());
}

#[test]
fn test_empty_spec_fails() {
    let env = setup_test_environment();
    let err = env.manager.storage("").unwrap_err();
    assert!(matches!(err.as_storage(), Some(StorageSystemError::EmptySpec { .. })));
}

#[test]
fn test_creator_path_is_keyed_by_creator() -> Result<()> {
    let env = setup_test_environment();
    let built = Arc::new(AtomicUsize::new(0));
    let creator = Arc::new(CountingCreator {
        key: "project-state".to_string(),
        built: built.clone(),
        delay_ms: 0,
    });

    let a = env
        .manager
        .get_or_create_storage(&StorageSpec::new("a.xml").creator(creator.clone()))?;
    let b = env
        .manager
        .get_or_create_storage(&StorageSpec::new("b.xml").creator(creator))?;

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(env.manager.get_cached_storage("project-state").is_some());
    assert!(env.manager.get_cached_storage("a.xml").is_none());
    Ok(())
}

#[test]
fn test_concurrent_workspace_creation_runs_once() {
    let env = Arc::new(setup_test_environment());
    let built = Arc::new(AtomicUsize::new(0));
    let creator = Arc::new(CountingCreator {
        key: "workspace.xml".to_string(),
        built: built.clone(),
        delay_ms: 50,
    });
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let env = env.clone();
            let creator = creator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                env.manager
                    .get_or_create_storage(&StorageSpec::new("workspace.xml").creator(creator))
                    .expect("creation should succeed")
            })
        })
        .collect();

    let results: Vec<Arc<dyn StateStorage>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(Arc::ptr_eq(&results[0], &results[1]));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_customizer_applies_on_every_request() -> Result<()> {
    let env = setup_test_environment();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let customizer: StorageCustomizer = Arc::new(move |_storage: &dyn StateStorage| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let spec = StorageSpec::new("editor.xml").customizer(customizer);

    env.manager.get_or_create_storage(&spec)?;
    env.manager.get_or_create_storage(&spec)?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_roaming_downgrade() {
    let env = setup_test_environment();
    for requested in [RoamingType::Default, RoamingType::PerOs, RoamingType::PerPlatform, RoamingType::Disabled] {
        assert_eq!(
            env.manager.effective_roaming_type(requested, "workspace.xml"),
            RoamingType::Disabled
        );
    }
    assert_eq!(
        env.manager.effective_roaming_type(RoamingType::PerOs, "editor.xml"),
        RoamingType::PerOs
    );
}

#[test]
fn test_set_macros_returns_previous_table() -> Result<()> {
    let env = setup_test_environment();
    let editor = env.manager.storage("$APP_CONFIG$/editor.xml")?;

    let previous = env.manager.set_macros(vec![Macro::new("$ROOT_CONFIG$", "/srv/other")])?;
    assert_eq!(previous.len(), 2);
    assert_eq!(env.manager.macros().len(), 1);

    // Cached storages keep the path they were built with
    let again = env.manager.storage("$APP_CONFIG$/editor.xml")?;
    assert!(Arc::ptr_eq(&editor, &again));
    assert_eq!(again.file_path(), Some(env.root().join("options/editor.xml")));

    // New specs resolve against the new table
    assert!(env.manager.storage("$APP_CONFIG$/other-editor.xml").is_err());
    Ok(())
}

#[test]
fn test_clear_empties_and_deregisters_own_entries() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let tracker = Arc::new(InMemoryChangeTracker::new());
    let first = builder_for(&temp_dir).tracker(tracker.clone()).name("first").build()?;
    let second = builder_for(&temp_dir).tracker(tracker.clone()).name("second").build()?;

    first.storage("a.xml")?;
    first.storage("b.xml")?;
    second.storage("c.xml")?;
    assert_eq!(tracker.len(), 3);

    first.clear_storages()?;
    assert!(first.cached_storages().is_empty());
    assert_eq!(tracker.paths(), vec![temp_dir.path().join("c.xml")]);
    assert_eq!(second.cached_storages().len(), 1);

    // Storages are rebuilt after a clear
    let rebuilt = first.storage("a.xml")?;
    assert!(tracker.contains(&rebuilt.file_path().unwrap()));
    Ok(())
}

#[test]
fn test_clear_reports_deregistration_failures() -> Result<()> {
    #[derive(Debug, Default)]
    struct RefusingTracker {
        inner: InMemoryChangeTracker,
    }

    impl ChangeTracker for RefusingTracker {
        fn put(&self, path: PathBuf, storage: Arc<dyn StateStorage>) -> Result<()> {
            self.inner.put(path, storage)
        }

        fn remove(&self, path: &std::path::Path) -> Result<()> {
            if path.ends_with("locked.xml") {
                return Err("path is locked".into());
            }
            self.inner.remove(path)
        }

        fn contains(&self, path: &std::path::Path) -> bool {
            self.inner.contains(path)
        }

        fn remove_where(&self, predicate: &dyn Fn(&std::path::Path, &dyn StateStorage) -> bool) -> usize {
            self.inner.remove_where(predicate)
        }

        fn storage_for(&self, path: &std::path::Path) -> Option<Arc<dyn StateStorage>> {
            self.inner.storage_for(path)
        }
    }

    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir)
        .tracker(Arc::new(RefusingTracker::default()))
        .build()?;
    manager.storage("locked.xml")?;
    manager.storage("free.xml")?;

    let err = manager.clear_storages().unwrap_err();
    match err.as_storage() {
        Some(StorageSystemError::DeregistrationFailed { failures }) => assert_eq!(failures.len(), 1),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(manager.cached_storages().is_empty());
    Ok(())
}

#[test]
fn test_cached_file_storages_filters() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir)
        .register_custom_storage(CUSTOM_CLASS, memory_factory())?
        .build()?;
    manager.storage("a.xml")?;
    manager.get_or_create_storage(&StorageSpec::new("mem").custom_class(CUSTOM_CLASS))?;

    let specs = vec!["a.xml\\".to_string(), CUSTOM_CLASS.to_string(), "missing.xml".to_string()];
    let found = manager.cached_file_storages(&specs, None);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].spec(), "a.xml");
    assert!(manager.get_cached_storage("missing.xml").is_none());
    Ok(())
}

#[test]
fn test_listener_state_resolves_on_first_default_storage() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir)
        .register_custom_storage(CUSTOM_CLASS, memory_factory())?
        .build()?;

    manager.get_or_create_storage(&StorageSpec::new("mem").custom_class(CUSTOM_CLASS))?;
    assert_eq!(manager.vfs_listener_state(), VfsListenerState::Unknown);

    manager.storage("a.xml")?;
    assert_eq!(manager.vfs_listener_state(), VfsListenerState::Enabled);
    Ok(())
}

#[test]
fn test_missing_extension_through_manager() -> Result<()> {
    let env = setup_test_environment();
    assert!(matches!(
        env.manager.storage("noext").unwrap_err().as_storage(),
        Some(StorageSystemError::MissingExtension(_))
    ));

    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let headless = builder_for(&temp_dir).headless(true).build()?;
    assert!(headless.storage("noext").is_ok());
    Ok(())
}
