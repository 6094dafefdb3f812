use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod s3;
pub mod save_file;
pub mod send_net;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Defines the destination for the finished backup archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutSink {
    /// Save the archive to a local file (or into a local directory).
    SaveToFile(PathBuf),
    /// Upload the archive to a remote URL via HTTP POST.
    UploadToUrl(String),
    /// Upload the archive to an object-storage bucket.
    UploadToS3 { bucket: String },
}

impl FromStr for OutSink {
    type Err = Error;

    /// `s3://bucket` selects object storage, `http(s)://...` an HTTP
    /// endpoint, anything else is a local path.
    fn from_str(output: &str) -> Result<Self, Self::Err> {
        let output = output.trim();
        if output.is_empty() {
            return Err(Error::InvalidSink("output is empty".to_string()));
        }

        if let Some(rest) = output.strip_prefix("s3://") {
            let bucket = rest.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(Error::InvalidSink(format!(
                    "expected s3://<bucket>, got '{output}'"
                )));
            }
            Ok(OutSink::UploadToS3 {
                bucket: bucket.to_string(),
            })
        } else if output.starts_with("http://") || output.starts_with("https://") {
            Ok(OutSink::UploadToUrl(output.to_string()))
        } else {
            Ok(OutSink::SaveToFile(PathBuf::from(output)))
        }
    }
}

impl fmt::Display for OutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutSink::SaveToFile(path) => write!(f, "{}", path.display()),
            OutSink::UploadToUrl(url) => f.write_str(url),
            OutSink::UploadToS3 { bucket } => write!(f, "s3://{bucket}"),
        }
    }
}

/// Credentials and endpoint settings for the object-storage upload.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    /// Defaults to [`DEFAULT_REGION`] when unset.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
}

impl S3Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: None,
            endpoint: None,
        }
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

// Secret key is never printed.
impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
