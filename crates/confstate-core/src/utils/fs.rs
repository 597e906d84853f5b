use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;

/// Write `contents` to `path` atomically, creating parent directories.
///
/// The data goes to a temporary file in the target directory which then replaces `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => {
            return Err(Error::from(StorageSystemError::InvalidPath {
                path: path.to_path_buf(),
                reason: "Cannot write to path without parent directory".to_string(),
            }));
        }
    };
    if !parent.is_dir() {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, "create_dir_all", parent.to_path_buf()))?;
    }

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| Error::io(e, "create_temp_file", parent.to_path_buf()))?;
    temp_file.write_all(contents)
        .map_err(|e| Error::io(e, "write_to_temp_file", temp_file.path().to_path_buf()))?;
    temp_file.persist(path)
        .map_err(|e| Error::io(e.error, "persist_temp_file", path.to_path_buf()))?;
    Ok(())
}

/// Read a file, `None` if it does not exist
pub fn read_to_string_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(e, "read_to_string", path.to_path_buf())),
    }
}

/// Remove a file; returns whether it existed
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(e, "remove_file", path.to_path_buf())),
    }
}

/// Files directly inside `dir` with the given extension, sorted. Missing directory -> empty.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, "read_dir", dir.to_path_buf())),
    };

    let extension_lower = extension.to_lowercase();
    let mut result = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, "read_dir_entry", dir.to_path_buf()))?;
        let path = entry.path();
        let matches = path.is_file()
            && path.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase() == extension_lower)
                .unwrap_or(false);
        if matches {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}
