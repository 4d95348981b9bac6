//! deptool - prebuilt native dependency artifacts
//!
//! Packages a built dependency's files into a tar.gz archive with a SHA-256
//! sidecar, moves archive pairs to and from object storage, and activates a
//! verified copy into `<name>/_active_/prebuilt/<platform>` for the build.

pub mod activate;
pub mod archive;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod error;
pub mod sync;

pub use activate::{activate, activate_artifact, ActivationOutcome};
pub use catalog::{
    is_valid_dependency_name, is_valid_platform, ArtifactId, DependencyName, DepsLayout, Platform,
    PlatformSelector, Version,
};
pub use config::{CliOverrides, ConfigError, DeptoolConfig};
pub use error::{Error, Missing, Result};
pub use sync::{download, upload, DownloadOutcome, ObjectStore, StoreError, UploadReport};
