use crate::kernel::constants::{CACHE_FILE_MACRO, NON_ROAMABLE_FILE, WORKSPACE_FILE, WORKSPACE_FILE_MACRO};
use crate::storage::roaming::{effective_roaming_type, RoamingType, VfsListenerState};

#[test]
fn test_reserved_specs_never_roam() {
    for spec in [WORKSPACE_FILE, WORKSPACE_FILE_MACRO, NON_ROAMABLE_FILE, CACHE_FILE_MACRO] {
        for requested in [RoamingType::Default, RoamingType::PerOs, RoamingType::PerPlatform] {
            assert_eq!(effective_roaming_type(requested, spec), RoamingType::Disabled, "{}", spec);
        }
    }
}

#[test]
fn test_other_specs_keep_requested_roaming() {
    assert_eq!(
        effective_roaming_type(RoamingType::PerOs, "$APP_CONFIG$/editor.xml"),
        RoamingType::PerOs
    );
    assert_eq!(
        effective_roaming_type(RoamingType::Disabled, "$APP_CONFIG$/editor.xml"),
        RoamingType::Disabled
    );
    // Only exact reserved names are downgraded
    assert_eq!(
        effective_roaming_type(RoamingType::Default, "$APP_CONFIG$/other.xml"),
        RoamingType::Default
    );
}

#[test]
fn test_roaming_serde_names() {
    assert_eq!(serde_json::to_string(&RoamingType::PerPlatform).unwrap(), "\"per_platform\"");
    let parsed: RoamingType = serde_json::from_str("\"disabled\"").unwrap();
    assert_eq!(parsed, RoamingType::Disabled);
    assert_eq!(RoamingType::PerOs.to_string(), "per_os");
}

#[test]
fn test_listener_state_defaults_to_unknown() {
    assert_eq!(VfsListenerState::default(), VfsListenerState::Unknown);
    assert!(!VfsListenerState::Unknown.is_resolved());
    assert!(VfsListenerState::Enabled.is_resolved());
    assert!(VfsListenerState::Disabled.is_resolved());
}
