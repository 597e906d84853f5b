use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json;
#[cfg(feature = "yaml-config")]
use serde_yaml;
#[cfg(feature = "toml-config")]
use toml;

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;

/// Supported storage document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// JSON format (.json), also used for extensions no other format claims
    #[default]
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    /// Format for a storage file, falling back to `default` for unknown extensions
    pub fn for_storage_file(path: &Path, default: ConfigFormat) -> Self {
        Self::from_path(path).unwrap_or(default)
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "JSON",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "YAML",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "TOML",
        }
    }

    /// Serialize any value in this format
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<String> {
        let serialized = match self {
            ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(boxed),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(value).map_err(boxed),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(value).map_err(boxed),
        };
        serialized.map_err(|source| {
            Error::from(StorageSystemError::SerializationError {
                format: self.name().to_string(),
                source,
            })
        })
    }

    /// Deserialize any value in this format
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self, data: &str) -> Result<T> {
        let parsed = match self {
            ConfigFormat::Json => serde_json::from_str(data).map_err(boxed),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(boxed),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(boxed),
        };
        parsed.map_err(|source| {
            Error::from(StorageSystemError::DeserializationError {
                format: self.name().to_string(),
                source,
            })
        })
    }
}

fn boxed<E: std::error::Error + Send + Sync + 'static>(e: E) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(e)
}

/// In-memory state of one component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    /// Raw configuration values
    #[serde(flatten)]
    values: BTreeMap<String, serde_json::Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Create a configuration from a map
    pub fn from_map(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Get a configuration value
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a configuration value with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Raw JSON value for a key
    pub fn get_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        match serde_json::to_value(value) {
            Ok(json_value) => {
                self.values.insert(key.to_string(), json_value);
                Ok(())
            },
            Err(e) => Err(Error::from(StorageSystemError::SerializationError {
                format: "JSON".to_string(),
                source: Box::new(e),
            })),
        }
    }

    /// Remove a configuration value
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &serde_json::Value) -> bool) {
        self.values.retain(|k, v| keep(k, v));
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get all keys
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    /// Merge with another config, overriding existing values
    pub fn merge(&mut self, other: &ConfigData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Rewrite every string value, recursively.
    pub fn map_strings(&mut self, f: &dyn Fn(&str) -> String) {
        for value in self.values.values_mut() {
            map_value_strings(value, f);
        }
    }
}

fn map_value_strings(value: &mut serde_json::Value, f: &dyn Fn(&str) -> String) {
    match value {
        serde_json::Value::String(s) => *s = f(s),
        serde_json::Value::Array(items) => {
            for item in items {
                map_value_strings(item, f);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                map_value_strings(item, f);
            }
        }
        _ => {}
    }
}
