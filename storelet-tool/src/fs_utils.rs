use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use storelet_lib::Config;
use storelet_lib::naming::{absolute_root, member_name};
use storelet_lib::walk::collect_files;

/// A file that a backup run would add, with its name inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub path: PathBuf,
    pub member: String,
}

/// Lists every file under `config.paths` together with its archive member
/// name, exactly as the backup would name it.
pub fn list_planned_entries(config: &Config) -> Result<Vec<PlannedEntry>> {
    let preserve_paths = config.preserve_paths.unwrap_or(false);
    let mut result = Vec::new();

    for p in config.paths.iter().flatten() {
        let root = absolute_root(Path::new(p)).with_context(|| format!("resolving path {p}"))?;
        for path in collect_files(&root) {
            let member = member_name(&root, &path, preserve_paths, None);
            result.push(PlannedEntry { path, member });
        }
    }

    Ok(result)
}

/// Total size of all planned files; files that vanished are not counted.
pub fn total_size(entries: &[PlannedEntry]) -> u64 {
    entries
        .iter()
        .filter_map(|entry| fs::metadata(&entry.path).ok())
        .map(|meta| meta.len())
        .sum()
}

/// Convert bytes into a human-friendly string using binary (KiB, MiB, GiB...) units.
pub fn encode_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    // 1.0 MiB prints as 1 MiB; round before deciding, 1.04 KiB is "1 KiB"
    let rounded = (size * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{:.0} {}", rounded, UNITS[unit_index])
    } else {
        format!("{:.1} {}", rounded, UNITS[unit_index])
    }
}
