//! Dependency activation
//!
//! Materializes one `(name, version, platform)` archive into the shared
//! `<name>/_active_/prebuilt/<platform>` slot that the build reads from.
//!
//! The active slot does not record which version it holds, only the checksum
//! of the archive it was expanded from. Activation is a no-op when that
//! checksum equals the candidate's sidecar byte-for-byte, so two versions with
//! identical archives count as the same activation.
//!
//! Replacement is staged: the archive is expanded into a hidden sibling
//! directory, the old slot is renamed aside, the staged directory is renamed
//! into place and only then is the old copy deleted. A failure before the swap
//! leaves the previous active copy untouched.
//!
//! Callers must not run two activations for the same `(name, platform)`
//! concurrently.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::archive::{self, UnpackStats};
use crate::catalog::{validate_request, ArtifactId, DepsLayout, ACTIVE_CHECKSUM_FILE};
use crate::checksum::{read_checksum, write_checksum};
use crate::error::{Error, IoContext, Missing, Result};

const STAGING_MARKER: &str = "staging-";
const RETIRED_MARKER: &str = "retired-";

/// Result of an activation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationOutcome {
    /// The active slot already held this archive; nothing was written
    AlreadyActive { path: PathBuf },
    /// The archive was expanded into the active slot
    Activated {
        path: PathBuf,
        files: usize,
        bytes: u64,
        /// Whether a previous active copy was replaced
        replaced: bool,
    },
}

impl ActivationOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ActivationOutcome::AlreadyActive { path } => path,
            ActivationOutcome::Activated { path, .. } => path,
        }
    }
}

/// Validate a raw request and activate it.
///
/// `platform` must name a single platform; `all` is rejected.
pub fn activate(
    layout: &DepsLayout,
    name: &str,
    version: &str,
    platform: &str,
) -> Result<ActivationOutcome> {
    let (dependency, version, selector) = validate_request(name, version, platform)?;
    let platform = selector.single("activation")?;
    activate_artifact(layout, &ArtifactId::new(dependency, version, platform))
}

/// Activate an already-validated artifact.
pub fn activate_artifact(layout: &DepsLayout, id: &ArtifactId) -> Result<ActivationOutcome> {
    let archive_path = layout.archive(id);
    let checksum_path = layout.checksum(id);

    // TODO: fall back to sync::download when the version directory is missing
    let preflight = [
        (Missing::DependencyDir, layout.dependency_dir(id.dependency)),
        (Missing::VersionDir, layout.version_dir(id.dependency, &id.version)),
        (Missing::Archive, archive_path.clone()),
        (Missing::Checksum, checksum_path.clone()),
    ];
    for (what, path) in preflight {
        if !path.try_exists().ctx("stat", &path)? {
            return Err(Error::NotFound { what, path });
        }
    }

    let checksum = read_checksum(&checksum_path)?;
    let active_dir = layout.active_platform_dir(id.dependency, id.platform);
    let active_checksum = layout.active_checksum(id.dependency, id.platform);

    if is_current(&active_dir, &active_checksum, &checksum) {
        tracing::info!(
            dependency = %id.dependency,
            version = %id.version,
            platform = %id.platform,
            "dependency already activated"
        );
        return Ok(ActivationOutcome::AlreadyActive { path: active_dir });
    }

    let (stats, replaced) = replace_active(layout, id, &archive_path, &checksum)?;

    tracing::info!(
        dependency = %id.dependency,
        version = %id.version,
        platform = %id.platform,
        files = stats.files,
        bytes = stats.bytes,
        replaced,
        "dependency activated"
    );

    Ok(ActivationOutcome::Activated {
        path: active_dir,
        files: stats.files,
        bytes: stats.bytes,
        replaced,
    })
}

/// Whether the active slot already holds an archive with this checksum.
///
/// Any read problem counts as "not current" and triggers a fresh activation.
fn is_current(active_dir: &Path, active_checksum: &Path, candidate: &[u8]) -> bool {
    if !active_dir.is_dir() || !active_checksum.is_file() {
        return false;
    }
    match fs::read(active_checksum) {
        Ok(existing) => existing == candidate,
        Err(_) => false,
    }
}

fn replace_active(
    layout: &DepsLayout,
    id: &ArtifactId,
    archive_path: &Path,
    checksum: &[u8],
) -> Result<(UnpackStats, bool)> {
    let prebuilt = layout.active_prebuilt_dir(id.dependency);
    let target = layout.active_platform_dir(id.dependency, id.platform);
    let platform = id.platform.as_str();

    create_dir_all_rwx(&prebuilt)?;
    sweep_leftovers(&prebuilt, platform);

    let tag = Uuid::new_v4().simple().to_string();
    let staging = prebuilt.join(format!(".{}.{}{}", platform, STAGING_MARKER, tag));
    create_dir_all_rwx(&staging)?;

    let staged = archive::unpack_file(archive_path, &staging).and_then(|stats| {
        write_checksum(&staging.join(ACTIVE_CHECKSUM_FILE), checksum)?;
        Ok(stats)
    });
    let stats = match staged {
        Ok(stats) => stats,
        Err(e) => {
            discard(&staging);
            return Err(e);
        }
    };

    let retired = if fs::symlink_metadata(&target).is_ok() {
        let retired = prebuilt.join(format!(".{}.{}{}", platform, RETIRED_MARKER, tag));
        if let Err(e) = fs::rename(&target, &retired) {
            discard(&staging);
            return Err(Error::io("move aside previous active copy", &target, e));
        }
        Some(retired)
    } else {
        None
    };

    if let Err(e) = fs::rename(&staging, &target) {
        if let Some(retired) = &retired {
            let _ = fs::rename(retired, &target);
        }
        discard(&staging);
        return Err(Error::io("move staged copy into place", &target, e));
    }

    if let Some(retired) = &retired {
        discard(retired);
    }

    Ok((stats, retired.is_some()))
}

/// Remove staging and retired directories left behind by interrupted runs.
fn sweep_leftovers(prebuilt: &Path, platform: &str) {
    let Ok(entries) = fs::read_dir(prebuilt) else {
        return;
    };
    let staging = format!(".{}.{}", platform, STAGING_MARKER);
    let retired = format!(".{}.{}", platform, RETIRED_MARKER);

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&staging) || name.starts_with(&retired) {
            tracing::debug!(
                path = %entry.path().display(),
                "removing leftover activation directory"
            );
            discard(&entry.path());
        }
    }
}

/// Remove a directory tree, or a single file or symlink.
fn discard(path: &Path) {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    if let Err(e) = removed {
        tracing::warn!(path = %path.display(), error = %e, "failed to clean up");
    }
}

/// Create a directory tree with full owner permissions.
fn create_dir_all_rwx(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path).ctx("create directory", path)
}
