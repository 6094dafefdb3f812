use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

/// Recursively lists every regular file under `root` in directory-tree
/// order (siblings sorted by name). Symlinks are not descended into but a
/// symlink to a regular file is listed.
///
/// Unreadable directories, dangling links and a missing `root` are logged
/// and skipped; the walk itself never fails.
pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry under {}: {err}", root.display());
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_file() {
            files.push(entry.into_path());
        } else if file_type.is_symlink() {
            if entry.path().is_file() {
                files.push(entry.into_path());
            } else if !entry.path().exists() {
                warn!("skipping dangling symlink {}", entry.path().display());
            }
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("inner.txt"), "x").unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        fs::write(dir.path().join("c.txt"), "x").unwrap();

        let files = collect_files(dir.path());

        assert_eq!(
            files,
            vec![
                dir.path().join("a.txt"),
                dir.path().join("b").join("inner.txt"),
                dir.path().join("c.txt"),
            ]
        );
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&dir.path().join("absent")).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();

        assert_eq!(collect_files(dir.path()), vec![dir.path().join("real.txt")]);
    }
}
