//! Remote sync of artifact archives
//!
//! Download pulls one platform's archive and checksum from object storage
//! into the local layout. Upload packages one or all platforms' pre-archive
//! directories, writes their checksums and pushes both files.

pub mod keys;
pub mod store;

pub use keys::{
    local_file_for_key, local_path_from_key, remote_key, remote_key_from_local, ArtifactFile,
};
pub use store::{DirObjectStore, MemoryObjectStore, ObjectStore, StoreError};

use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::archive::{pack_to_file, FilteredDir};
use crate::catalog::{validate_request, with_suffix, ArtifactId, DepsLayout, Platform};
use crate::checksum::{sha256_file, write_checksum};
use crate::error::{Error, IoContext, Result};

/// Filenames kept out of uploaded archives unless configured otherwise
pub const DEFAULT_EXCLUDED_FILENAMES: &[&str] = &[".DS_Store"];

/// Result of a download request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The artifact directory is already installed; nothing was fetched
    AlreadyPresent { path: PathBuf },
    /// Archive and checksum were written to these local paths
    Downloaded { files: Vec<PathBuf> },
}

/// One platform pushed by an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedArtifact {
    pub platform: Platform,
    pub archive_key: String,
    pub checksum_key: String,
    pub checksum: String,
}

/// Result of an upload request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedArtifact>,
    /// Platforms with no local pre-archive directory
    pub skipped: Vec<Platform>,
}

/// What a local artifact directory looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactPresence {
    Missing,
    /// Exists but lacks headers, or lacks both libraries and sources
    Incomplete,
    Installed,
}

/// Classify an artifact directory by the files it holds.
///
/// A directory counts as installed when it has at least one header and at
/// least one static library or source file.
pub fn artifact_presence(dir: &Path) -> Result<ArtifactPresence> {
    if !dir.try_exists().ctx("stat", dir)? {
        return Ok(ArtifactPresence::Missing);
    }

    let mut headers = 0usize;
    let mut sources = 0usize;
    let mut libs = 0usize;

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io("walk", path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("h" | "hpp") => headers += 1,
            Some("c" | "cpp") => sources += 1,
            Some("a" | "lib") => libs += 1,
            _ => {}
        }
    }

    if headers == 0 || (libs == 0 && sources == 0) {
        Ok(ArtifactPresence::Incomplete)
    } else {
        Ok(ArtifactPresence::Installed)
    }
}

/// Download one platform's archive and checksum into the local layout.
///
/// When the artifact directory is already installed this is a no-op unless
/// `force` is set, in which case the directory is removed first.
pub fn download(
    store: &dyn ObjectStore,
    layout: &DepsLayout,
    name: &str,
    version: &str,
    platform: &str,
    force: bool,
) -> Result<DownloadOutcome> {
    let (dependency, version, selector) = validate_request(name, version, platform)?;
    let platform = selector.single("download")?;
    let id = ArtifactId::new(dependency, version, platform);

    tracing::info!(
        dependency = %id.dependency,
        version = %id.version,
        platform = %id.platform,
        force,
        "downloading artifacts"
    );

    let artifact_dir = layout.artifact_dir(&id);
    match artifact_presence(&artifact_dir)? {
        ArtifactPresence::Installed if !force => {
            tracing::info!(
                path = %artifact_dir.display(),
                "artifacts already present locally, use --force to download again"
            );
            return Ok(DownloadOutcome::AlreadyPresent { path: artifact_dir });
        }
        ArtifactPresence::Missing => {}
        ArtifactPresence::Incomplete if !force => {}
        _ => {
            fs::remove_dir_all(&artifact_dir).ctx("remove artifact directory", &artifact_dir)?;
        }
    }

    let mut files = Vec::with_capacity(2);
    for file in ArtifactFile::BOTH {
        let key = remote_key(&id, file);
        let local = local_file_for_key(layout.root(), &key)?;
        tracing::info!(key = %key, path = %local.display(), "writing");
        fetch_to_file(store, &key, &local)?;
        files.push(local);
    }

    Ok(DownloadOutcome::Downloaded { files })
}

/// Stream one object into `dest` through a `.part` file.
fn fetch_to_file(store: &dyn ObjectStore, key: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).ctx("create directory", parent)?;
    }

    let mut reader = store.download(key).map_err(|e| Error::remote(key, e))?;
    let part = with_suffix(dest.to_path_buf(), ".part");

    let copied = copy_object(&mut reader, key, &part);
    if let Err(e) = copied.and_then(|_| fs::rename(&part, dest).ctx("rename", dest)) {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    Ok(())
}

fn copy_object(reader: &mut dyn Read, key: &str, part: &Path) -> Result<()> {
    let mut file = File::create(part).ctx("create local file", part)?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| Error::remote(key, StoreError::Io(e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n]).ctx("write local file", part)?;
    }
    file.sync_all().ctx("sync local file", part)
}

/// Package and push the pre-archive directory of one or all platforms.
///
/// Platforms without a local directory are skipped. Any other failure stops
/// the upload immediately.
pub fn upload(
    store: &dyn ObjectStore,
    layout: &DepsLayout,
    name: &str,
    version: &str,
    platform: &str,
    excluded_filenames: &[String],
) -> Result<UploadReport> {
    let (dependency, version, selector) = validate_request(name, version, platform)?;

    tracing::info!(
        dependency = %dependency,
        version = %version,
        platform = %selector,
        "uploading artifacts"
    );

    let mut report = UploadReport::default();
    for platform in selector.platforms() {
        let id = ArtifactId::new(dependency, version.clone(), platform);
        let dir = layout.artifact_dir(&id);

        if !dir.try_exists().ctx("stat", &dir)? {
            tracing::info!(path = %dir.display(), "path does not exist, skipping");
            report.skipped.push(platform);
            continue;
        }

        report
            .uploaded
            .push(upload_platform(store, layout, &id, &dir, excluded_filenames)?);
    }

    tracing::info!(
        uploaded = report.uploaded.len(),
        skipped = report.skipped.len(),
        "upload finished"
    );
    Ok(report)
}

fn upload_platform(
    store: &dyn ObjectStore,
    layout: &DepsLayout,
    id: &ArtifactId,
    dir: &Path,
    excluded_filenames: &[String],
) -> Result<UploadedArtifact> {
    let archive_path = layout.archive(id);
    let checksum_path = layout.checksum(id);

    pack_to_file(&FilteredDir::new(dir, excluded_filenames.iter().cloned()), &archive_path)?;

    // Hash what landed on disk, not an in-memory copy
    let checksum = sha256_file(&archive_path)?;
    write_checksum(&checksum_path, checksum.as_bytes())?;

    let archive_key = push_file(store, layout.root(), &archive_path)?;
    let checksum_key = push_file(store, layout.root(), &checksum_path)?;

    tracing::info!(
        platform = %id.platform,
        key = %archive_key,
        checksum = %checksum,
        "uploaded"
    );

    Ok(UploadedArtifact {
        platform: id.platform,
        archive_key,
        checksum_key,
        checksum,
    })
}

fn push_file(store: &dyn ObjectStore, deps_root: &Path, path: &Path) -> Result<String> {
    let key = remote_key_from_local(deps_root, path)?;
    let mut file = File::open(path).ctx("open for upload", path)?;
    store
        .upload(&key, &mut file)
        .map_err(|e| Error::remote(&key, e))?;
    Ok(key)
}
