pub mod fs;

use std::path::Path;

/// Get the file name from a path
pub fn file_name<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
}

/// Whether the last path component has an extension
pub fn has_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().contains('.'))
        .unwrap_or(false)
}
