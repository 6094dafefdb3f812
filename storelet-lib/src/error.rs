use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("archive backup '{name}' is already closed")]
    Closed { name: String },

    #[error("failed to allocate temporary storage: {source}")]
    TempAllocation { source: io::Error },

    #[error("I/O error on '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("upload to '{target}' failed: {source}")]
    Upload {
        target: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP upload failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid output sink: {0}")]
    InvalidSink(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
