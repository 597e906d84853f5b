//! File-backed manager configuration.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kernel::constants::{APP_CONFIG_MACRO, ROOT_CONFIG_MACRO};
use crate::kernel::error::{Error, Result};
use crate::storage::config::ConfigFormat;
use crate::storage::macros::Macro;

fn default_true() -> bool {
    true
}

/// Settings a [`StateStorageManager`](crate::storage::manager::StateStorageManager) is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Headless managers accept storage files without an extension
    #[serde(default)]
    pub headless: bool,
    /// Macro table; the first entry is the root for relative specs
    #[serde(default)]
    pub macros: Vec<Macro>,
    /// Format for storage files whose extension names none
    #[serde(default)]
    pub default_format: ConfigFormat,
    /// When false, stream providers added to the manager are ignored
    #[serde(default = "default_true")]
    pub stream_providers_enabled: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            headless: false,
            macros: Vec::new(),
            default_format: ConfigFormat::Json,
            stream_providers_enabled: true,
        }
    }
}

impl ManagerSettings {
    /// Load settings from a JSON, YAML or TOML file, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        let settings_error = |message: String| Error::Settings {
            path: Some(path.to_path_buf()),
            message,
        };
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| settings_error("unrecognized settings file extension".to_string()))?;
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, "read_settings", path.to_path_buf()))?;
        let settings: ManagerSettings = format
            .deserialize(&content)
            .map_err(|e| settings_error(e.to_string()))?;
        settings.validate().map_err(|e| settings_error(e.to_string()))?;
        log::debug!("Loaded manager settings from {} ({} macros)", path.display(), settings.macros.len());
        Ok(settings)
    }

    /// Settings rooted at `root`: `$ROOT_CONFIG$` is `root` and `$APP_CONFIG$` is
    /// `root/options`. Existing macros with the same keys are replaced.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.macros
            .retain(|m| m.key != ROOT_CONFIG_MACRO && m.key != APP_CONFIG_MACRO);
        let mut rooted = vec![
            Macro::from_path(ROOT_CONFIG_MACRO, root),
            Macro::new(APP_CONFIG_MACRO, format!("{}/options", ROOT_CONFIG_MACRO)),
        ];
        rooted.append(&mut self.macros);
        self.macros = rooted;
        self
    }

    /// Serialize to `path` in the format its extension names
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| Error::Settings {
            path: Some(path.to_path_buf()),
            message: "unrecognized settings file extension".to_string(),
        })?;
        let content = format.serialize(self)?;
        crate::utils::fs::write_atomic(path, content.as_bytes())
    }

    fn validate(&self) -> Result<()> {
        crate::storage::macros::MacroTable::new(self.macros.clone())?;
        Ok(())
    }

    /// Path of the root directory macro, if configured
    pub fn root(&self) -> Option<PathBuf> {
        self.macros
            .iter()
            .find(|m| m.key == ROOT_CONFIG_MACRO)
            .map(|m| PathBuf::from(&m.value))
    }
}
