#![cfg(test)]

use std::fs;
use std::sync::Arc;

use super::common::{builder_for, component, setup_test_environment, MemoryStorage};
use crate::kernel::error::Result;
use crate::storage::directory::ComponentSplitter;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::CreationContext;
use crate::storage::manager::StorageSpec;
use crate::storage::roaming::VfsListenerState;
use crate::storage::state::{ProviderDataChange, SaveOutcome, StateSplitter, StateStorage, StorageCreator};
use crate::storage::stream::InMemoryStreamProvider;

#[test]
fn test_save_all_reports_each_storage() -> Result<()> {
    let env = setup_test_environment();
    let editor = env.manager.storage("$APP_CONFIG$/editor.xml")?;
    let ui = env.manager.storage("$APP_CONFIG$/ui.xml")?;
    env.manager.storage("$APP_CONFIG$/untouched.xml")?;

    editor.set_state("Editor", component("size", 12))?;
    ui.set_state("Theme", component("name", "dark"))?;

    let report = env.manager.save_all();
    assert!(report.is_success());
    assert_eq!(
        report.saved,
        vec![
            ("$APP_CONFIG$/editor.xml".to_string(), SaveOutcome::Local),
            ("$APP_CONFIG$/ui.xml".to_string(), SaveOutcome::Local),
        ]
    );
    assert_eq!(report.unchanged, 1);
    assert!(env.root().join("options/editor.xml").exists());
    assert!(!env.root().join("options/untouched.xml").exists());

    let again = env.manager.save_all();
    assert!(again.saved.is_empty());
    assert_eq!(again.unchanged, 3);
    Ok(())
}

#[test]
fn test_save_all_collects_failures() -> Result<()> {
    struct ReadOnlyCreator;

    impl StorageCreator for ReadOnlyCreator {
        fn key(&self) -> String {
            "read-only".to_string()
        }

        fn create(&self, context: &CreationContext<'_>) -> Result<Arc<dyn StateStorage>> {
            Ok(Arc::new(MemoryStorage {
                fail_save: true,
                ..MemoryStorage::new(context.spec)
            }))
        }
    }

    let env = setup_test_environment();
    env.manager
        .get_or_create_storage(&StorageSpec::new("ro.xml").creator(Arc::new(ReadOnlyCreator)))?;
    let fine = env.manager.storage("fine.xml")?;
    fine.set_state("B", component("x", 2))?;

    let report = env.manager.save_all();
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "ro.xml");
    assert_eq!(report.saved, vec![("fine.xml".to_string(), SaveOutcome::Local)]);
    Ok(())
}

#[test]
fn test_rename_moves_file_and_tracker_entry() -> Result<()> {
    let env = setup_test_environment();
    let storage = env.manager.storage("$APP_CONFIG$/old.xml")?;
    storage.set_state("Editor", component("size", 1))?;
    storage.save()?;
    let old_path = env.root().join("options/old.xml");
    assert!(env.manager.tracker().contains(&old_path));

    let new_path = env.manager.rename_storage("$APP_CONFIG$/old.xml", "new.xml")?;
    assert_eq!(new_path, env.root().join("options/new.xml"));
    assert!(new_path.exists());
    assert!(!old_path.exists());
    assert!(env.manager.tracker().contains(&new_path));
    assert!(!env.manager.tracker().contains(&old_path));

    // Still cached under the original spec, now backed by the new file
    let same = env.manager.storage("$APP_CONFIG$/old.xml")?;
    assert!(Arc::ptr_eq(&storage, &same));
    assert_eq!(same.file_path(), Some(new_path));
    Ok(())
}

#[test]
fn test_rename_errors() {
    let env = setup_test_environment();
    assert!(matches!(
        env.manager.rename_storage("missing.xml", "x.xml").unwrap_err().as_storage(),
        Some(StorageSystemError::StorageNotFound(_))
    ));

    env.manager.storage("a.xml").unwrap();
    assert!(matches!(
        env.manager.rename_storage("a.xml", "sub/b.xml").unwrap_err().as_storage(),
        Some(StorageSystemError::InvalidPath { .. })
    ));
}

#[test]
fn test_external_change_is_routed_to_owner() -> Result<()> {
    let env = setup_test_environment();
    let storage = env.manager.storage("editor.xml")?;
    storage.set_state("Editor", component("size", 1))?;
    storage.save()?;

    let path = env.root().join("editor.xml");
    let content = fs::read_to_string(&path).unwrap().replace("\"size\": 1", "\"size\": 7");
    fs::write(&path, content).unwrap();

    assert!(env.manager.notify_external_change(&path)?);
    assert_eq!(storage.get_state("Editor")?.unwrap().get::<i64>("size"), Some(7));
    assert!(!env.manager.notify_external_change(&env.root().join("unrelated.xml"))?);
    Ok(())
}

#[test]
fn test_external_change_inside_directory_storage() -> Result<()> {
    let env = setup_test_environment();
    let splitter: Arc<dyn StateSplitter> = Arc::new(ComponentSplitter);
    let keymaps = env
        .manager
        .get_or_create_storage(&StorageSpec::new("keymaps").splitter(splitter))?;
    keymaps.set_state("Default", component("a", 1))?;
    keymaps.save()?;

    let dir = env.root().join("keymaps");
    assert!(dir.join("Default.json").exists());
    fs::write(dir.join("Mac.json"), r#"{"component": "Mac", "state": {"a": 2}}"#).unwrap();

    assert!(env.manager.notify_external_change(&dir.join("Mac.json"))?);
    assert_eq!(keymaps.component_names()?, vec!["Default".to_string(), "Mac".to_string()]);
    Ok(())
}

#[test]
fn test_external_change_skips_untracked_storage() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let manager = builder_for(&temp_dir)
        .stream_provider(Arc::new(InMemoryStreamProvider::new("server").with_prefix("remote/").exclusive(true)))
        .build()?;
    let storage = manager.storage("editor.xml")?;
    let path = temp_dir.path().join("editor.xml");
    assert_eq!(manager.vfs_listener_state(), VfsListenerState::Disabled);
    assert!(!manager.tracker().contains(&path));

    storage.set_state("Editor", component("size", 1))?;
    assert!(!manager.notify_external_change(&path)?);
    assert!(storage.is_dirty());
    assert_eq!(storage.get_state("Editor")?.unwrap().get::<i64>("size"), Some(1));
    Ok(())
}

#[test]
fn test_provider_data_state_changed_reaches_storage() -> Result<()> {
    let env = setup_test_environment();
    let storage = env.manager.storage("editor.xml")?;
    storage.set_state("Editor", component("size", 1))?;
    storage.save()?;

    fs::write(
        env.root().join("editor.xml"),
        r#"{"components": {"Editor": {"size": 3}}}"#,
    )
    .unwrap();
    assert!(env.manager.provider_data_state_changed("editor.xml", ProviderDataChange::Reset));
    assert_eq!(storage.get_state("Editor")?.unwrap().get::<i64>("size"), Some(3));

    assert!(!env.manager.provider_data_state_changed("missing.xml", ProviderDataChange::Reset));
    Ok(())
}
