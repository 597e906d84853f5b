#![cfg(test)]

use std::sync::Arc;

use super::common::{builder_for, component, setup_test_environment};
use crate::kernel::error::Result;
use crate::storage::roaming::RoamingType;
use crate::storage::manager::StorageSpec;
use crate::storage::settings::ManagerSettings;
use crate::storage::state::SaveOutcome;
use crate::storage::stream::{InMemoryStreamProvider, StreamProvider};

#[test]
fn test_provider_chain_through_manager() -> Result<()> {
    let env = setup_test_environment();
    let sync = Arc::new(InMemoryStreamProvider::new("sync").with_prefix("$APP_CONFIG$/"));
    env.manager.add_stream_provider(sync.clone(), false);
    env.manager
        .add_stream_provider(Arc::new(InMemoryStreamProvider::new("backup")), true);

    let names: Vec<String> = env
        .manager
        .stream_provider()
        .providers()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["backup", "sync"]);

    let editor = env.manager.storage("$APP_CONFIG$/editor.xml")?;
    editor.set_state("Editor", component("size", 4))?;
    assert_eq!(editor.save()?, SaveOutcome::LocalAndProvider);
    assert!(sync.contains("$APP_CONFIG$/editor.xml"));

    assert_eq!(env.manager.remove_stream_providers("sync"), 1);
    assert_eq!(env.manager.stream_provider().len(), 1);
    Ok(())
}

#[test]
fn test_remote_content_wins_on_first_load() -> Result<()> {
    let env = setup_test_environment();
    let sync = Arc::new(InMemoryStreamProvider::new("sync"));
    sync.put("editor.xml", r#"{"components": {"Editor": {"size": 30}}}"#);
    env.manager.add_stream_provider(sync, false);

    let editor = env.manager.storage("editor.xml")?;
    assert_eq!(editor.get_state("Editor")?.unwrap().get::<i64>("size"), Some(30));
    Ok(())
}

#[test]
fn test_local_only_storage_removes_remote_copy() -> Result<()> {
    let env = setup_test_environment();
    let sync = Arc::new(InMemoryStreamProvider::new("sync"));
    sync.put("workspace.xml", "{}");
    sync.put("cache.json", "{}");
    env.manager.add_stream_provider(sync.clone(), false);

    env.manager.storage("workspace.xml")?;
    env.manager
        .get_or_create_storage(&StorageSpec::new("cache.json").roaming(RoamingType::Disabled))?;
    assert!(!sync.contains("workspace.xml"));
    assert!(!sync.contains("cache.json"));
    Ok(())
}

#[test]
fn test_export_blocked() {
    let env = setup_test_environment();
    assert!(!env.manager.is_export_blocked());
    env.manager
        .add_stream_provider(Arc::new(InMemoryStreamProvider::new("server").block_export(true)), false);
    assert!(env.manager.is_export_blocked());
}

#[test]
fn test_disabled_providers_setting_ignores_additions() -> Result<()> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let settings = ManagerSettings {
        stream_providers_enabled: false,
        ..ManagerSettings::default()
    }
    .with_root(temp_dir.path());
    let manager = builder_for(&temp_dir)
        .settings(&settings)
        .stream_provider(Arc::new(InMemoryStreamProvider::new("sync")))
        .build()?;

    manager.add_stream_provider(Arc::new(InMemoryStreamProvider::new("later")), false);
    assert!(manager.stream_provider().is_empty());
    Ok(())
}
