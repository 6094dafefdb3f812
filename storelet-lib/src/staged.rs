use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::archive::IncludeDirectory;
use crate::error::{Error, Result};

/// A scratch directory whose contents end up in the owner under `name`.
///
/// Write whatever should be backed up into [`path`](Self::path), then call
/// [`finish`](Self::finish). Dropping an unfinished staged directory does
/// the same fold-in and removal, logging instead of returning errors.
pub struct StagedDirectory<'a, O: IncludeDirectory + ?Sized> {
    name: String,
    path: PathBuf,
    dir: Option<TempDir>,
    owner: &'a mut O,
}

impl<'a, O: IncludeDirectory + ?Sized> StagedDirectory<'a, O> {
    pub fn new(name: impl Into<String>, owner: &'a mut O) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("storelet-stage-")
            .tempdir()
            .map_err(|source| Error::TempAllocation { source })?;
        let path = dir.path().to_path_buf();
        let name = name.into();

        debug!("staging '{name}' in {}", path.display());
        Ok(Self {
            name,
            path,
            dir: Some(dir),
            owner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Folds the directory into the owner, then deletes it.
    ///
    /// The directory is removed even when the fold-in fails; that failure
    /// is returned once cleanup has been attempted.
    pub fn finish(mut self) -> Result<usize> {
        self.complete()
    }

    fn complete(&mut self) -> Result<usize> {
        let Some(dir) = self.dir.take() else {
            return Ok(0);
        };

        let included = self
            .owner
            .include_directory(&self.path, false, Some(&self.name));
        let removed = dir.close().map_err(|e| Error::io(&self.path, e));

        let count = included?;
        removed?;
        debug!("staged '{}' folded in and removed", self.name);
        Ok(count)
    }
}

impl<O: IncludeDirectory + ?Sized> AsRef<Path> for StagedDirectory<'_, O> {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl<O: IncludeDirectory + ?Sized> fmt::Display for StagedDirectory<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl<O: IncludeDirectory + ?Sized> fmt::Debug for StagedDirectory<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedDirectory")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("finished", &self.dir.is_none())
            .finish()
    }
}

impl<O: IncludeDirectory + ?Sized> Drop for StagedDirectory<'_, O> {
    fn drop(&mut self) {
        if let Err(err) = self.complete() {
            warn!("staged directory '{}': {err}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct RecordingOwner {
        calls: Vec<Call>,
        fail: bool,
    }

    struct Call {
        source: PathBuf,
        preserve_paths: bool,
        name: Option<String>,
        existed: bool,
        files: Vec<String>,
    }

    impl IncludeDirectory for RecordingOwner {
        fn include_directory(
            &mut self,
            source: &Path,
            preserve_paths: bool,
            name: Option<&str>,
        ) -> Result<usize> {
            let mut files: Vec<String> = fs::read_dir(source)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            files.sort();

            let count = files.len();
            self.calls.push(Call {
                source: source.to_path_buf(),
                preserve_paths,
                name: name.map(str::to_owned),
                existed: source.is_dir(),
                files,
            });

            if self.fail {
                Err(Error::InvalidSink("owner refused".into()))
            } else {
                Ok(count)
            }
        }
    }

    #[test]
    fn finish_folds_then_removes() {
        let mut owner = RecordingOwner::default();
        let staged = StagedDirectory::new("generated", &mut owner).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.is_dir());
        fs::write(staged.join("dump.sql"), "select 1;").unwrap();

        assert_eq!(staged.finish().unwrap(), 1);

        assert!(!path.exists());
        assert_eq!(owner.calls.len(), 1);
        let call = &owner.calls[0];
        assert_eq!(call.source, path);
        assert!(!call.preserve_paths);
        assert_eq!(call.name.as_deref(), Some("generated"));
        assert!(call.existed);
        assert_eq!(call.files, vec!["dump.sql".to_string()]);
    }

    #[test]
    fn drop_folds_exactly_once() {
        let mut owner = RecordingOwner::default();
        let path = {
            let staged = StagedDirectory::new("scoped", &mut owner).unwrap();
            fs::write(staged.join("a.txt"), "a").unwrap();
            staged.path().to_path_buf()
        };

        assert!(!path.exists());
        assert_eq!(owner.calls.len(), 1);
        assert_eq!(owner.calls[0].files, vec!["a.txt".to_string()]);
    }

    #[test]
    fn failed_fold_still_removes_directory() {
        let mut owner = RecordingOwner {
            fail: true,
            ..Default::default()
        };
        let staged = StagedDirectory::new("broken", &mut owner).unwrap();
        let path = staged.path().to_path_buf();

        let err = staged.finish().unwrap_err();

        assert!(matches!(err, Error::InvalidSink(_)));
        assert!(!path.exists());
        assert_eq!(owner.calls.len(), 1);
    }

    #[test]
    fn projections_expose_directory() {
        let mut owner = RecordingOwner::default();
        let staged = StagedDirectory::new("x", &mut owner).unwrap();
        assert_eq!(staged.to_string(), staged.path().display().to_string());
        let as_path: &Path = staged.as_ref();
        assert_eq!(as_path, staged.path());
        assert_eq!(staged.name(), "x");
    }
}
