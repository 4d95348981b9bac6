//! Local dependencies-root layout
//!
//! ```text
//! <root>/<name>/<version>/prebuilt/<platform>/...            pre-archive tree
//! <root>/<name>/<version>/prebuilt/<platform>.tar.gz          archive
//! <root>/<name>/<version>/prebuilt/<platform>.tar.gz.sha256   checksum
//! <root>/<name>/_active_/prebuilt/<platform>/...             active copy
//! <root>/<name>/_active_/prebuilt/<platform>/checksum.sha256
//! ```

use std::path::{Path, PathBuf};

use super::{ArtifactId, DependencyName, Platform, Version};

/// Directory holding the active copy of each platform
pub const ACTIVE_DIR_NAME: &str = "_active_";

/// Local-only segment between version and platform
pub const PREBUILT_DIR_NAME: &str = "prebuilt";

/// Checksum sidecar inside an active platform directory
pub const ACTIVE_CHECKSUM_FILE: &str = "checksum.sha256";

/// Absolute paths under a dependencies root
#[derive(Debug, Clone)]
pub struct DepsLayout {
    root: PathBuf,
}

impl DepsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dependency_dir(&self, dependency: DependencyName) -> PathBuf {
        self.root.join(dependency.as_str())
    }

    pub fn version_dir(&self, dependency: DependencyName, version: &Version) -> PathBuf {
        self.dependency_dir(dependency).join(version.as_str())
    }

    pub fn artifact_dir(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.artifact_path())
    }

    pub fn archive(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.archive_path())
    }

    pub fn checksum(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.checksum_path())
    }

    /// `<root>/<name>/_active_`
    pub fn active_dir(&self, dependency: DependencyName) -> PathBuf {
        self.dependency_dir(dependency).join(ACTIVE_DIR_NAME)
    }

    /// `<root>/<name>/_active_/prebuilt`, parent of every active platform slot
    pub fn active_prebuilt_dir(&self, dependency: DependencyName) -> PathBuf {
        self.active_dir(dependency).join(PREBUILT_DIR_NAME)
    }

    pub fn active_platform_dir(&self, dependency: DependencyName, platform: Platform) -> PathBuf {
        self.active_prebuilt_dir(dependency).join(platform.as_str())
    }

    pub fn active_checksum(&self, dependency: DependencyName, platform: Platform) -> PathBuf {
        self.active_platform_dir(dependency, platform)
            .join(ACTIVE_CHECKSUM_FILE)
    }
}
