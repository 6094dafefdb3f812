//! Helpers for writing backup scripts: zip a set of directories into one
//! archive and ship it to a local path, an HTTP endpoint or a bucket.
//!
//! ```no_run
//! use storelet_lib::ArchiveBackup;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backup = ArchiveBackup::new("website")?;
//! backup.include_directory("/var/www", false, Some("www"))?;
//!
//! let staged = backup.include_new_directory("db")?;
//! std::fs::write(staged.join("dump.sql"), "-- dump")?;
//! staged.finish()?;
//!
//! backup.save_to("/mnt/backups")?;
//! backup.close()?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod archive;
pub mod error;
pub mod naming;
pub mod sink;
pub mod staged;
pub mod walk;

pub use archive::{ArchiveBackup, Compressor, IncludeDirectory};
pub use error::{Error, Result};
pub use sink::{OutSink, S3Credentials};
pub use staged::StagedDirectory;

/// Settings shared by the tool's environment, config file and CLI layers.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub name: Option<String>,
    pub output: Option<String>,
    pub config: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub preserve_paths: Option<bool>,
    pub compress: Option<bool>,
    pub dry: Option<bool>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub paths: Option<Vec<String>>,
    /// `NAME=COMMAND` generators run inside staged directories.
    pub generate: Option<Vec<String>>,
}

impl Config {
    /// Object-storage credentials, when both keys are configured.
    pub fn credentials(&self) -> Option<S3Credentials> {
        let access_key = self.access_key.as_deref().filter(|k| !k.is_empty())?;
        let secret_key = self.secret_key.as_deref().filter(|k| !k.is_empty())?;

        Some(S3Credentials {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        })
    }

    pub fn compressor(&self) -> Compressor {
        if self.compress.unwrap_or(true) {
            Compressor::Deflate
        } else {
            Compressor::Stored
        }
    }
}
