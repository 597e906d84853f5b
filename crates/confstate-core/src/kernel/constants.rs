/// Application name
pub const APP_NAME: &str = "confstate";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version stamped into every saved storage document
pub const STORAGE_FORMAT_VERSION: &str = "1";

/// Attribute name carrying [`STORAGE_FORMAT_VERSION`]
pub const VERSION_ATTRIBUTE: &str = "version";

/// Root configuration directory macro. Relative specs resolve against the first macro,
/// which is conventionally this one.
pub const ROOT_CONFIG_MACRO: &str = "$ROOT_CONFIG$";

/// Application options directory macro
pub const APP_CONFIG_MACRO: &str = "$APP_CONFIG$";

/// Workspace file macro
pub const WORKSPACE_FILE_MACRO: &str = "$WORKSPACE_FILE$";

/// Cache file macro
pub const CACHE_FILE_MACRO: &str = "$CACHE_FILE$";

/// Plain workspace file spec
pub const WORKSPACE_FILE: &str = "workspace.xml";

/// File for state that must never leave the machine
pub const NON_ROAMABLE_FILE: &str = "other.xml";

/// Specs that are always stored with roaming disabled
pub const NON_ROAMABLE_SPECS: &[&str] = &[
    WORKSPACE_FILE,
    WORKSPACE_FILE_MACRO,
    NON_ROAMABLE_FILE,
    CACHE_FILE_MACRO,
];

/// Default settings file name looked up by the CLI
pub const SETTINGS_FILE_NAME: &str = "confstate.toml";
