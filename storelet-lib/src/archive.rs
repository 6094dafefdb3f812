use std::collections::HashSet;
use std::fs::{File, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Datelike, Local, Timelike, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::naming::{absolute_root, member_name, object_key};
use crate::sink::{OutSink, S3Credentials, s3, save_file, send_net};
use crate::staged::StagedDirectory;
use crate::walk::collect_files;

/// Something a directory tree can be folded into.
///
/// [`ArchiveBackup`] is the real implementation; [`StagedDirectory`] only
/// needs this capability from its owner.
pub trait IncludeDirectory {
    fn include_directory(
        &mut self,
        source: &Path,
        preserve_paths: bool,
        name: Option<&str>,
    ) -> Result<usize>;
}

/// Compression algorithm used for archive members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compressor {
    #[default]
    Deflate,
    Stored,
}

impl Compressor {
    fn method(self) -> CompressionMethod {
        match self {
            Compressor::Deflate => CompressionMethod::Deflated,
            Compressor::Stored => CompressionMethod::Stored,
        }
    }
}

/// A backup session backed by one temporary ZIP file.
///
/// Directories are appended with [`include_directory`](Self::include_directory)
/// (repeatable, contents merge), generated content goes through
/// [`include_new_directory`](Self::include_new_directory), and the result is
/// delivered with [`save_to`](Self::save_to), [`upload_to_s3`](Self::upload_to_s3)
/// or [`upload_to_url`](Self::upload_to_url). The temporary file is removed by
/// [`close`](Self::close) or, failing that, when the value is dropped.
#[derive(Debug)]
pub struct ArchiveBackup {
    name: String,
    compression: Compressor,
    path: Option<TempPath>,
}

impl ArchiveBackup {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_compression(name, Compressor::default())
    }

    pub fn with_compression(name: impl Into<String>, compression: Compressor) -> Result<Self> {
        let name = name.into();
        // The container itself is created lazily on first write.
        let path = tempfile::Builder::new()
            .prefix("storelet-")
            .suffix(".zip")
            .tempfile()
            .map_err(|source| Error::TempAllocation { source })?
            .into_temp_path();

        debug!("backup '{name}' allocated {}", path.display());
        Ok(Self {
            name,
            compression,
            path: Some(path),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression(&self) -> Compressor {
        self.compression
    }

    pub fn is_closed(&self) -> bool {
        self.path.is_none()
    }

    /// Location of the backing archive file.
    pub fn path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| Error::Closed {
            name: self.name.clone(),
        })
    }

    /// Adds every file under `source` to the archive and returns how many
    /// members were written.
    ///
    /// Files that cannot be read are logged and skipped. A member whose name
    /// already exists in the archive replaces the earlier one.
    pub fn include_directory(
        &mut self,
        source: impl AsRef<Path>,
        preserve_paths: bool,
        name: Option<&str>,
    ) -> Result<usize> {
        let archive_path = self.path()?.to_path_buf();
        let source = source.as_ref();
        let root = absolute_root(source).map_err(|e| Error::io(source, e))?;

        let mut entries: Vec<(String, PathBuf)> = collect_files(&root)
            .into_iter()
            .map(|file| (member_name(&root, &file, preserve_paths, name), file))
            .collect();
        dedup_keep_last(&mut entries);

        let incoming: HashSet<&str> = entries.iter().map(|(member, _)| member.as_str()).collect();
        drop_replaced_members(&archive_path, &incoming)?;

        let mut zip = open_writer(&archive_path)?;
        let mut written = 0;

        for (member, file) in &entries {
            let mut input = match File::open(file) {
                Ok(input) => input,
                Err(err) => {
                    warn!("skipping {}: {err}", file.display());
                    continue;
                }
            };

            let options = self.file_options(input.metadata().ok().as_ref());
            zip.start_file(member.as_str(), options)?;

            if let Err(err) = io::copy(&mut input, &mut zip) {
                warn!("skipping {}: read failed: {err}", file.display());
                zip.abort_file()?;
                continue;
            }

            debug!("{} -> {member}", file.display());
            written += 1;
        }

        zip.finish()?;
        info!(
            "backup '{}': included {} file(s) from {}",
            self.name,
            written,
            root.display()
        );
        Ok(written)
    }

    /// Creates a scratch directory that is folded into this backup under
    /// `name` once it is finished (or dropped).
    pub fn include_new_directory(&mut self, name: impl Into<String>) -> Result<StagedDirectory<'_, Self>> {
        self.path()?;
        StagedDirectory::new(name, self)
    }

    /// Names of the members currently in the archive.
    pub fn member_names(&self) -> Result<Vec<String>> {
        let archive_path = self.path()?;
        let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
        if is_empty(&file, archive_path)? {
            return Ok(Vec::new());
        }

        let archive = ZipArchive::new(file)?;
        Ok(archive.file_names().map(str::to_owned).collect())
    }

    /// Copies the archive to a local destination and returns the written
    /// path. See [`save_file::resolve_destination`] for naming.
    pub fn save_to(&self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let archive_path = self.ensure_container()?;
        let target = save_file::resolve_destination(destination.as_ref(), &self.name, Utc::now());

        let bytes = save_file::save_file(archive_path, &target)?;
        info!(
            "backup '{}' saved to {} ({bytes} bytes)",
            self.name,
            target.display()
        );
        Ok(target)
    }

    /// Uploads the archive as `<name>_<YYYYMMDDHHMMSS>.zip` and returns
    /// the object key.
    pub fn upload_to_s3(&self, bucket: &str, credentials: &S3Credentials) -> Result<String> {
        let archive_path = self.ensure_container()?;
        let key = object_key(&self.name, Utc::now());
        s3::upload_file(bucket, &key, archive_path, credentials)?;
        Ok(key)
    }

    pub fn upload_to_url(&self, url: &str) -> Result<()> {
        let archive_path = self.ensure_container()?;
        send_net::send_http(url, archive_path)
    }

    /// Sends the archive to `sink` and returns where it ended up.
    pub fn deliver(&self, sink: &OutSink, credentials: Option<&S3Credentials>) -> Result<String> {
        match sink {
            OutSink::SaveToFile(destination) => {
                let target = self.save_to(destination)?;
                Ok(target.display().to_string())
            }
            OutSink::UploadToUrl(url) => {
                self.upload_to_url(url)?;
                Ok(url.clone())
            }
            OutSink::UploadToS3 { bucket } => {
                let credentials = credentials.ok_or_else(|| {
                    Error::InvalidSink(format!("{sink} requires access and secret keys"))
                })?;
                let key = self.upload_to_s3(bucket, credentials)?;
                Ok(format!("s3://{bucket}/{key}"))
            }
        }
    }

    /// Deletes the temporary archive. Any later operation, including a
    /// second `close`, fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let path = self.path.take().ok_or_else(|| Error::Closed {
            name: self.name.clone(),
        })?;

        let location = path.to_path_buf();
        path.close().map_err(|e| Error::io(&location, e))?;
        debug!("backup '{}' removed {}", self.name, location.display());
        Ok(())
    }

    /// Makes sure the backing file holds a valid (possibly empty) container.
    fn ensure_container(&self) -> Result<&Path> {
        let archive_path = self.path()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(archive_path)
            .map_err(|e| Error::io(archive_path, e))?;

        if is_empty(&file, archive_path)? {
            ZipWriter::new(file).finish()?;
        }
        Ok(archive_path)
    }

    fn file_options(&self, metadata: Option<&Metadata>) -> SimpleFileOptions {
        let mut options = SimpleFileOptions::default().compression_method(self.compression.method());

        if let Some(metadata) = metadata {
            options = options.large_file(metadata.len() >= u64::from(u32::MAX));

            if let Some(modified) = metadata.modified().ok().and_then(zip_timestamp) {
                options = options.last_modified_time(modified);
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                options = options.unix_permissions(metadata.permissions().mode());
            }
        }

        options
    }
}

impl IncludeDirectory for ArchiveBackup {
    fn include_directory(
        &mut self,
        source: &Path,
        preserve_paths: bool,
        name: Option<&str>,
    ) -> Result<usize> {
        ArchiveBackup::include_directory(self, source, preserve_paths, name)
    }
}

impl Drop for ArchiveBackup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let location = path.to_path_buf();
            if let Err(err) = path.close() {
                warn!("failed to remove {}: {err}", location.display());
            }
        }
    }
}

fn is_empty(file: &File, path: &Path) -> Result<bool> {
    let metadata = file.metadata().map_err(|e| Error::io(path, e))?;
    Ok(metadata.len() == 0)
}

/// Opens the archive for appending, creating the container on first use.
fn open_writer(archive_path: &Path) -> Result<ZipWriter<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(archive_path)
        .map_err(|e| Error::io(archive_path, e))?;

    if is_empty(&file, archive_path)? {
        Ok(ZipWriter::new(file))
    } else {
        Ok(ZipWriter::new_append(file)?)
    }
}

/// Drops earlier files that map to the same member name as a later one
/// (e.g. non-UTF-8 names differing only in invalid bytes). Order is kept.
fn dedup_keep_last(entries: &mut Vec<(String, PathBuf)>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entries.len());
    for (member, file) in entries.drain(..).rev() {
        if seen.insert(member.clone()) {
            kept.push((member, file));
        } else {
            debug!("{} is shadowed by a later file named {member}", file.display());
        }
    }
    kept.reverse();
    *entries = kept;
}

/// Rewrites the archive without the members about to be written again.
///
/// Entries are copied raw, so nothing is recompressed. No-op when no
/// incoming name collides.
fn drop_replaced_members(archive_path: &Path, incoming: &HashSet<&str>) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    if is_empty(&file, archive_path)? {
        return Ok(());
    }

    let mut existing = ZipArchive::new(file)?;
    let replaced = existing
        .file_names()
        .filter(|member| incoming.contains(member))
        .count();
    if replaced == 0 {
        return Ok(());
    }
    debug!("replacing {replaced} existing member(s) in {}", archive_path.display());

    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let rewritten = tempfile::Builder::new()
        .prefix(".storelet-")
        .tempfile_in(parent)
        .map_err(|source| Error::TempAllocation { source })?;

    let mut writer = ZipWriter::new(rewritten.as_file());
    for index in 0..existing.len() {
        let entry = existing.by_index_raw(index)?;
        if incoming.contains(entry.name()) {
            continue;
        }
        writer.raw_copy_file(entry)?;
    }
    writer.finish()?;
    drop(existing);

    rewritten
        .persist(archive_path)
        .map_err(|e| Error::io(archive_path, e.error))?;
    Ok(())
}

fn zip_timestamp(modified: SystemTime) -> Option<zip::DateTime> {
    let local: chrono::DateTime<Local> = modified.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}
