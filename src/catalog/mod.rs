//! Dependency catalog and validation
//!
//! The closed set of dependency names and target platforms lives in the two
//! tables below. Everything else validates through [`DependencyName::parse`],
//! [`PlatformSelector::parse`] and [`Version::parse`] and builds paths through
//! [`artifact_path`], [`archive_path`] and [`checksum_path`].

mod layout;

pub use layout::{DepsLayout, ACTIVE_CHECKSUM_FILE, ACTIVE_DIR_NAME, PREBUILT_DIR_NAME};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Supported dependencies
const SUPPORTED_DEPENDENCIES: &[&str] = &["libluau", "libpng", "libjolt"];

/// Supported platforms, in fan-out order
const SUPPORTED_PLATFORMS: &[&str] = &["source", "android", "ios", "macos", "windows", "linux"];

/// Wildcard platform meaning "every supported platform"
pub const PLATFORM_ALL: &str = "all";

/// Archive suffix appended to an artifact path
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Checksum suffix appended to an archive path
pub const CHECKSUM_EXTENSION: &str = ".sha256";

pub fn is_valid_dependency_name(name: &str) -> bool {
    SUPPORTED_DEPENDENCIES.contains(&name)
}

/// Accepts any supported platform and the `all` wildcard.
pub fn is_valid_platform(name: &str) -> bool {
    SUPPORTED_PLATFORMS.contains(&name) || name == PLATFORM_ALL
}

/// A dependency name known to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DependencyName(&'static str);

impl DependencyName {
    pub fn parse(name: &str) -> Result<Self> {
        SUPPORTED_DEPENDENCIES
            .iter()
            .copied()
            .find(|n| *n == name)
            .map(Self)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid dependency name: {}", name)))
    }

    pub fn supported() -> impl Iterator<Item = DependencyName> {
        SUPPORTED_DEPENDENCIES.iter().copied().map(Self)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A concrete target platform (never the wildcard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Platform(&'static str);

impl Platform {
    pub fn parse(name: &str) -> Result<Self> {
        SUPPORTED_PLATFORMS
            .iter()
            .copied()
            .find(|p| *p == name)
            .map(Self)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid platform name: {}", name)))
    }

    pub fn supported() -> impl Iterator<Item = Platform> {
        SUPPORTED_PLATFORMS.iter().copied().map(Self)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A platform argument as given by a caller: one platform or `all`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSelector {
    All,
    One(Platform),
}

impl PlatformSelector {
    pub fn parse(name: &str) -> Result<Self> {
        if name == PLATFORM_ALL {
            return Ok(PlatformSelector::All);
        }
        Platform::parse(name).map(PlatformSelector::One)
    }

    /// Expand into the concrete platforms this selector covers.
    pub fn platforms(&self) -> Vec<Platform> {
        match self {
            PlatformSelector::All => Platform::supported().collect(),
            PlatformSelector::One(p) => vec![*p],
        }
    }

    /// The single platform, rejecting `all` for operations that address one slot.
    pub fn single(&self, operation: &str) -> Result<Platform> {
        match self {
            PlatformSelector::One(p) => Ok(*p),
            PlatformSelector::All => Err(Error::InvalidArgument(format!(
                "platform '{}' is not supported by {}",
                PLATFORM_ALL, operation
            ))),
        }
    }
}

impl fmt::Display for PlatformSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformSelector::All => f.write_str(PLATFORM_ALL),
            PlatformSelector::One(p) => p.fmt(f),
        }
    }
}

/// Opaque, caller-supplied version string
///
/// No ordering or parsing is applied. The string only has to be usable as a
/// single path segment and a single key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn parse(version: &str) -> Result<Self> {
        if version.is_empty() {
            return Err(Error::InvalidArgument("version is required".to_string()));
        }
        if version.contains('/')
            || version.contains('\\')
            || version == "."
            || version == ".."
            || version == ACTIVE_DIR_NAME
        {
            return Err(Error::InvalidArgument(format!(
                "invalid version: {}",
                version
            )));
        }
        Ok(Self(version.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `(name, version, platform)` triple identifying one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactId {
    pub dependency: DependencyName,
    pub version: Version,
    pub platform: Platform,
}

impl ArtifactId {
    pub fn new(dependency: DependencyName, version: Version, platform: Platform) -> Self {
        Self {
            dependency,
            version,
            platform,
        }
    }

    /// Relative `name/version/prebuilt/platform`
    pub fn artifact_path(&self) -> PathBuf {
        artifact_path(self.dependency, &self.version, self.platform)
    }

    pub fn archive_path(&self) -> PathBuf {
        archive_path(self.dependency, &self.version, self.platform)
    }

    pub fn checksum_path(&self) -> PathBuf {
        checksum_path(self.dependency, &self.version, self.platform)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}][{}]", self.dependency, self.version, self.platform)
    }
}

/// Validate a raw `(name, version, platform)` request.
///
/// Checks run in name, platform, version order.
pub fn validate_request(
    name: &str,
    version: &str,
    platform: &str,
) -> Result<(DependencyName, Version, PlatformSelector)> {
    let dependency = DependencyName::parse(name)?;
    let platform = PlatformSelector::parse(platform)?;
    let version = Version::parse(version)?;
    Ok((dependency, version, platform))
}

/// Relative directory holding one platform's pre-archive files.
pub fn artifact_path(dependency: DependencyName, version: &Version, platform: Platform) -> PathBuf {
    PathBuf::from(dependency.as_str())
        .join(version.as_str())
        .join(PREBUILT_DIR_NAME)
        .join(platform.as_str())
}

pub fn archive_path(dependency: DependencyName, version: &Version, platform: Platform) -> PathBuf {
    with_suffix(artifact_path(dependency, version, platform), ARCHIVE_EXTENSION)
}

pub fn checksum_path(dependency: DependencyName, version: &Version, platform: Platform) -> PathBuf {
    with_suffix(archive_path(dependency, version, platform), CHECKSUM_EXTENSION)
}

/// Append a literal suffix to the final path component.
pub(crate) fn with_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut s = path.into_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
