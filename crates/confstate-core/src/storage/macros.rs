//! Path macro table.
//!
//! A macro maps a `$NAME$` placeholder to an absolute directory. File specs are
//! written against macros (`$APP_CONFIG$/options/editor.xml`) and expanded to real
//! paths only when a storage is built; absolute paths are collapsed back into
//! macro form for display and lookups.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::storage::error::StorageSystemError;
use crate::storage::key::normalize_spec;

type MacroResult<T> = std::result::Result<T, StorageSystemError>;

/// A single `key -> value` substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    /// Placeholder, including the surrounding `$`
    pub key: String,
    /// Absolute slash-separated path, or a path starting with another macro
    pub value: String,
}

impl Macro {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a macro whose value is a filesystem path.
    pub fn from_path(key: impl Into<String>, path: &Path) -> Self {
        Self::new(key, path.to_string_lossy().replace('\\', "/"))
    }

    fn validate(&self) -> MacroResult<()> {
        let invalid = |reason: &str| StorageSystemError::InvalidMacro {
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        if self.key.len() < 3 || !self.key.starts_with('$') || !self.key.ends_with('$') {
            return Err(invalid("key must have the form $NAME$"));
        }
        if self.key.contains('/') || self.key.contains('\\') {
            return Err(invalid("key must not contain path separators"));
        }
        if self.value.is_empty() {
            return Err(invalid("value must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key, self.value)
    }
}

/// Ordered macro table. Earlier entries win ties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: Vec<Macro>,
}

impl MacroTable {
    /// Create a table, validating keys and normalizing values.
    pub fn new(macros: Vec<Macro>) -> MacroResult<Self> {
        let mut normalized = Vec::with_capacity(macros.len());
        for m in macros {
            m.validate()?;
            let mut value = m.value.replace('\\', "/");
            while value.len() > 1 && value.ends_with('/') {
                value.pop();
            }
            normalized.push(Macro { key: m.key, value });
        }
        Ok(Self { macros: normalized })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn macros(&self) -> &[Macro] {
        &self.macros
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Macro> {
        self.macros.iter().find(|m| m.key == key)
    }

    /// Expand a spec into an absolute path.
    ///
    /// Macro-prefixed specs use the longest matching key. Relative specs resolve
    /// against the first macro. Absolute filesystem paths match no entry and fail
    /// with `UnresolvedMacro`.
    pub fn expand(&self, spec: &str) -> MacroResult<PathBuf> {
        self.expand_to_string(spec).map(PathBuf::from)
    }

    /// Like [`expand`](Self::expand) but keeps the slash-separated string form.
    pub fn expand_to_string(&self, spec: &str) -> MacroResult<String> {
        let spec = spec.replace('\\', "/");
        let mut chain = Vec::new();
        self.expand_inner(&spec, &mut chain)
    }

    fn expand_inner(&self, spec: &str, chain: &mut Vec<String>) -> MacroResult<String> {
        if !spec.starts_with('$') {
            if spec.starts_with('/') || Path::new(spec).is_absolute() {
                return Err(self.unresolved(spec));
            }
            let root = self.macros.first().ok_or_else(|| self.unresolved(spec))?;
            let rooted = if spec.is_empty() {
                root.key.clone()
            } else {
                format!("{}/{}", root.key, spec)
            };
            return self.expand_inner(&rooted, chain);
        }

        let found = self.longest_prefix(spec).ok_or_else(|| self.unresolved(spec))?;
        if chain.iter().any(|k| k == &found.key) {
            let mut cycle = chain.clone();
            cycle.push(found.key.clone());
            return Err(StorageSystemError::MacroCycle {
                spec: spec.to_string(),
                chain: cycle,
            });
        }

        chain.push(found.key.clone());
        let base = if found.value.starts_with('$') {
            self.expand_inner(&found.value, chain)?
        } else {
            found.value.clone()
        };
        chain.pop();

        let rest = spec[found.key.len()..].trim_start_matches('/');
        Ok(join(&base, rest))
    }

    fn longest_prefix(&self, spec: &str) -> Option<&Macro> {
        let mut best: Option<&Macro> = None;
        for m in &self.macros {
            let matches = spec == m.key
                || (spec.starts_with(m.key.as_str()) && spec[m.key.len()..].starts_with('/'));
            if matches && best.is_none_or(|b| m.key.len() > b.key.len()) {
                best = Some(m);
            }
        }
        best
    }

    /// Collapse an absolute path into macro form.
    ///
    /// Policy: among macros whose expanded value occurs in `path` on a component
    /// boundary, the longest value wins (earlier entry on equal length), and only
    /// that one occurrence is substituted. The result is normalized.
    pub fn collapse(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        let mut best: Option<(&Macro, String, usize)> = None;

        for m in &self.macros {
            let value = match self.expand_to_string(&m.key) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if value.is_empty() {
                continue;
            }
            let Some(index) = boundary_match(&path, &value) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, v, _)| value.len() > v.len()) {
                best = Some((m, value, index));
            }
        }

        match best {
            Some((m, value, index)) => {
                let mut collapsed = String::with_capacity(path.len());
                collapsed.push_str(&path[..index]);
                collapsed.push_str(&m.key);
                // A value ending in a separator (the filesystem root) consumed it
                if value.ends_with('/') {
                    collapsed.push('/');
                }
                collapsed.push_str(&path[index + value.len()..]);
                normalize_spec(&collapsed)
            }
            None => normalize_spec(&path),
        }
    }

    /// Collapse a filesystem path.
    pub fn collapse_path(&self, path: &Path) -> String {
        self.collapse(&path.to_string_lossy())
    }

    fn unresolved(&self, spec: &str) -> StorageSystemError {
        StorageSystemError::UnresolvedMacro {
            spec: spec.to_string(),
            table: self.to_string(),
        }
    }
}

impl fmt::Display for MacroTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.macros.iter().map(|m| m.to_string()).collect();
        write!(f, "{}", entries.join(", "))
    }
}

fn join(base: &str, rest: &str) -> String {
    if rest.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, rest)
    } else {
        format!("{}/{}", base, rest)
    }
}

/// First occurrence of `value` in `path` that ends at a component boundary.
fn boundary_match(path: &str, value: &str) -> Option<usize> {
    path.match_indices(value)
        .map(|(index, _)| index)
        .find(|&index| {
            let end = index + value.len();
            end == path.len() || path[end..].starts_with('/') || value.ends_with('/')
        })
}

/// Macro table shared between the manager and the storages it builds.
///
/// Readers take cheap snapshots; writers replace the whole table.
#[derive(Debug, Default)]
pub struct SharedMacroTable {
    table: RwLock<Arc<MacroTable>>,
}

impl SharedMacroTable {
    pub fn new(table: MacroTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// Current table.
    pub fn snapshot(&self) -> Arc<MacroTable> {
        self.table.read().clone()
    }

    /// Replace the whole table, returning the previous entries.
    pub fn set_macros(&self, macros: Vec<Macro>) -> MacroResult<Vec<Macro>> {
        let table = MacroTable::new(macros)?;
        let previous = std::mem::replace(&mut *self.table.write(), Arc::new(table));
        log::debug!("Replaced macro table, previous had {} entries", previous.len());
        Ok(previous.macros().to_vec())
    }

    pub fn expand(&self, spec: &str) -> MacroResult<PathBuf> {
        self.snapshot().expand(spec)
    }

    pub fn collapse(&self, path: &str) -> String {
        self.snapshot().collapse(path)
    }
}
