//! Spec normalization and cache-key computation.
use std::fmt;

use crate::storage::error::StorageSystemError;
use crate::storage::state::StorageCreator;

/// Which kind of storage a spec asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum StorageClass {
    /// File or directory storage built from the spec's path
    #[default]
    Default,
    /// Custom storage type, identified by its fully-qualified tag
    Custom(String),
}

impl StorageClass {
    pub fn custom(tag: impl Into<String>) -> Self {
        StorageClass::Custom(tag.into())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, StorageClass::Default)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageClass::Default => write!(f, "<default>"),
            StorageClass::Custom(tag) => write!(f, "{}", tag),
        }
    }
}

/// Canonical form of a spec: `/` separators, no repeated separators, no trailing one.
pub fn normalize_spec(spec: &str) -> String {
    let mut normalized = String::with_capacity(spec.len());
    let mut previous_slash = false;
    for c in spec.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.push(c);
    }
    if normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Cache key for a storage request.
///
/// Custom classes share one instance per class regardless of the spec. A creator's own
/// key comes next; otherwise the normalized spec, which must not be empty.
pub fn compute_storage_key(
    class: &StorageClass,
    normalized_spec: &str,
    raw_spec: &str,
    creator: Option<&dyn StorageCreator>,
) -> Result<String, StorageSystemError> {
    if let StorageClass::Custom(tag) = class {
        return Ok(tag.clone());
    }
    if let Some(creator) = creator {
        return Ok(creator.key());
    }
    if normalized_spec.is_empty() {
        return Err(StorageSystemError::EmptySpec {
            raw: raw_spec.to_string(),
        });
    }
    Ok(normalized_spec.to_string())
}
