use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Timestamp layout used in uploaded object keys and `%datetime%`.
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Object key for an uploaded backup: `<name>_<YYYYMMDDHHMMSS>.zip`, UTC.
pub fn object_key(name: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.zip", name, now.format(KEY_TIMESTAMP_FORMAT))
}

/// Makes `path` absolute and resolves `.` and `..` lexically.
///
/// Symlinks are not followed, so `link/..` means the link's parent
/// directory, not the target's.
pub fn absolute_root(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                }
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Computes the name a file gets inside the archive.
///
/// Without `preserve_paths` the scanned `root` is stripped from `file`;
/// with it, the absolute path is kept minus its root (and drive prefix).
/// A logical `name` is prepended as a directory. Components are always
/// joined with `/`, whatever the host separator. When `root` is the file
/// itself, the file keeps its own name.
pub fn member_name(root: &Path, file: &Path, preserve_paths: bool, name: Option<&str>) -> String {
    let relative = if preserve_paths {
        file
    } else {
        match file.strip_prefix(root) {
            Ok(rest) if rest.as_os_str().is_empty() => file.file_name().map_or(file, Path::new),
            Ok(rest) => rest,
            Err(_) => file,
        }
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(prefix) = name.map(|n| n.trim_matches('/')).filter(|n| !n.is_empty()) {
        parts.push(prefix.to_string());
    }
    parts.extend(relative.components().filter_map(|c| match c {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }));

    parts.join("/")
}

/// Expands name placeholders in a destination file name.
///
/// Supported (case-insensitive): `%name%`, `%datetime%`, `%date%`, `%time%`,
/// `%yyyy%`, `%mm%` (month), `%dd%`, `%hh%`, `%unix%`.
pub fn render_template(template: &str, name: &str, now: DateTime<Utc>) -> String {
    let replacements = [
        ("%name%", name.to_string()),
        ("%datetime%", now.format(KEY_TIMESTAMP_FORMAT).to_string()),
        ("%date%", now.format("%Y-%m-%d").to_string()),
        ("%time%", now.format("%H-%M-%S").to_string()),
        ("%yyyy%", format!("{:04}", now.year())),
        ("%mm%", format!("{:02}", now.month())),
        ("%dd%", format!("{:02}", now.day())),
        ("%hh%", format!("{:02}", now.hour())),
        ("%unix%", now.timestamp().to_string()),
    ];

    let mut rendered = template.to_string();
    for (pattern, value) in replacements {
        rendered = replace_case_insensitive(&rendered, pattern, &value);
    }
    rendered
}

/// Case-insensitive (ASCII) substring replacement; byte offsets stay aligned
/// because ASCII lowercasing never changes lengths.
fn replace_case_insensitive(s: &str, pattern: &str, replacement: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let lower_s = s.to_ascii_lowercase();
    let lower_pattern = pattern.to_ascii_lowercase();

    let mut last_end = 0;
    while let Some(pos) = lower_s[last_end..].find(&lower_pattern) {
        let abs_pos = last_end + pos;
        result.push_str(&s[last_end..abs_pos]);
        result.push_str(replacement);
        last_end = abs_pos + pattern.len();
    }

    result.push_str(&s[last_end..]);
    result
}
