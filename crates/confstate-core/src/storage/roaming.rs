use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::constants::NON_ROAMABLE_SPECS;

/// Whether a storage's content may be synced across machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamingType {
    /// Synced as is
    #[default]
    Default,
    /// Synced separately per operating system
    PerOs,
    /// Synced separately per OS and architecture
    PerPlatform,
    /// Never leaves this machine
    Disabled,
}

impl RoamingType {
    pub fn is_roamable(self) -> bool {
        self != RoamingType::Disabled
    }
}

impl fmt::Display for RoamingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoamingType::Default => "default",
            RoamingType::PerOs => "per_os",
            RoamingType::PerPlatform => "per_platform",
            RoamingType::Disabled => "disabled",
        };
        write!(f, "{}", name)
    }
}

/// Roaming type actually applied to `spec`. Reserved specs never roam.
pub fn effective_roaming_type(requested: RoamingType, spec: &str) -> RoamingType {
    if requested != RoamingType::Disabled && NON_ROAMABLE_SPECS.contains(&spec) {
        return RoamingType::Disabled;
    }
    requested
}

/// Whether storages need change-tracker registration, decided once per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VfsListenerState {
    /// No default storage created yet
    #[default]
    Unknown,
    Enabled,
    Disabled,
}

impl VfsListenerState {
    pub fn is_resolved(self) -> bool {
        self != VfsListenerState::Unknown
    }
}
