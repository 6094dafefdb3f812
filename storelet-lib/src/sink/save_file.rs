use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::naming::{object_key, render_template};

/// Resolves where a backup named `name` lands for a local `destination`.
///
/// An existing directory receives `<name>_<timestamp>.zip`; anything else
/// is taken as a file path whose file name may carry placeholders.
pub fn resolve_destination(destination: &Path, name: &str, now: DateTime<Utc>) -> PathBuf {
    if destination.is_dir() {
        return destination.join(object_key(name, now));
    }

    match destination.file_name() {
        Some(file_name) => {
            let rendered = render_template(&file_name.to_string_lossy(), name, now);
            destination.with_file_name(rendered)
        }
        None => destination.join(object_key(name, now)),
    }
}

/// Copies the archive at `archive` to `destination`.
/// Automatically creates parent directories if they don't exist.
pub fn save_file(archive: &Path, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    fs::copy(archive, destination).map_err(|e| Error::io(destination, e))
}
