//! Error taxonomy shared by every deptool component.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::sync::store::StoreError;

/// Which preflight stage found a missing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    DependencyDir,
    VersionDir,
    Archive,
    Checksum,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Missing::DependencyDir => "dependency directory",
            Missing::VersionDir => "dependency version directory",
            Missing::Archive => "dependency platform archive",
            Missing::Checksum => "dependency platform checksum",
        };
        f.write_str(s)
    }
}

/// Errors returned by deptool operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} doesn't exist: {}", path.display())]
    NotFound { what: Missing, path: PathBuf },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported archive entry type {entry_type} at {}", path.display())]
    UnsupportedEntryType { path: PathBuf, entry_type: String },

    #[error("destination directory doesn't exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("archive entry escapes destination: {}", .0.display())]
    UnsafeEntryPath(PathBuf),

    #[error("remote transfer failed for key {key}: {source}")]
    RemoteTransfer {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid key format: {0}")]
    KeyFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the operation and path it came from.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn remote(key: impl Into<String>, source: StoreError) -> Self {
        Error::RemoteTransfer {
            key: key.into(),
            source,
        }
    }
}

/// Attach operation and path context to `io::Result`s.
pub(crate) trait IoContext<T> {
    fn ctx(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn ctx(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|e| Error::io(op, path, e))
    }
}
