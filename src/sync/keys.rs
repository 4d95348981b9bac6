//! Mapping between local artifact paths and object storage keys
//!
//! Local:  `<name>/<version>/prebuilt/<platform>.tar.gz[.sha256]`
//! Remote: `<name>/<version>/<platform>.tar.gz[.sha256]`
//!
//! [`local_path_from_key`] inserts the `prebuilt` segment and
//! [`remote_key_from_local`] removes it again; the two must stay exact inverses.

use std::path::{Component, Path, PathBuf};

use crate::catalog::{ArtifactId, ARCHIVE_EXTENSION, CHECKSUM_EXTENSION, PREBUILT_DIR_NAME};
use crate::error::{Error, Result};

/// Number of `/`-separated segments in every remote key
pub const KEY_SEGMENTS: usize = 3;

/// Which file of an artifact pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFile {
    Archive,
    Checksum,
}

impl ArtifactFile {
    pub const BOTH: [ArtifactFile; 2] = [ArtifactFile::Archive, ArtifactFile::Checksum];
}

/// Remote key for one file of an artifact.
pub fn remote_key(id: &ArtifactId, file: ArtifactFile) -> String {
    let archive_key = format!(
        "{}/{}/{}{}",
        id.dependency, id.version, id.platform, ARCHIVE_EXTENSION
    );
    match file {
        ArtifactFile::Archive => archive_key,
        ArtifactFile::Checksum => archive_key + CHECKSUM_EXTENSION,
    }
}

/// `/`-separated local path (relative to the deps root) for a remote key.
pub fn local_path_from_key(key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() != KEY_SEGMENTS {
        return Err(Error::KeyFormat(key.to_string()));
    }
    Ok([parts[0], parts[1], PREBUILT_DIR_NAME, parts[2]].join("/"))
}

/// Absolute local file for a remote key under `deps_root`.
pub fn local_file_for_key(deps_root: &Path, key: &str) -> Result<PathBuf> {
    let rel = local_path_from_key(key)?;
    Ok(rel.split('/').fold(deps_root.to_path_buf(), |path, part| path.join(part)))
}

/// Remote key for a local file under `deps_root`.
///
/// The path is made relative to the root, separators are normalized to `/`,
/// and a third segment of `prebuilt` is dropped.
pub fn remote_key_from_local(deps_root: &Path, local: &Path) -> Result<String> {
    let rel = local.strip_prefix(deps_root).map_err(|_| {
        Error::KeyFormat(format!(
            "{} is not under {}",
            local.display(),
            deps_root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => match s.to_str() {
                Some(s) => parts.push(s.replace('\\', "/")),
                None => return Err(Error::KeyFormat(rel.to_string_lossy().into_owned())),
            },
            Component::CurDir => {}
            _ => return Err(Error::KeyFormat(rel.to_string_lossy().into_owned())),
        }
    }
    let joined = parts.join("/");

    let mut segments: Vec<&str> = joined.split('/').collect();
    if segments.len() >= 3 && segments[2] == PREBUILT_DIR_NAME {
        segments.remove(2);
    }
    if segments.len() != KEY_SEGMENTS {
        return Err(Error::KeyFormat(joined));
    }
    Ok(segments.join("/"))
}
