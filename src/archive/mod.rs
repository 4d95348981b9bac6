//! tar.gz archive codec
//!
//! Converts a directory tree into a gzip-compressed tar stream and back.
//! Only directories and regular files are supported in either direction.
//!
//! Packing is canonical: entries are written depth-first in filename order
//! with mtime, uid and gid zeroed and modes normalized to 0o755/0o644, so the
//! same tree always produces the same archive bytes.

pub mod filtered;

pub use filtered::{EntryKind, FilteredDir, TreeEntry, TreeView};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header};

use crate::catalog::with_suffix;
use crate::error::{Error, IoContext, Result};

/// Counts from an unpack run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStats {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Pack every entry visible through `view` into `writer`.
///
/// Returns the writer once the gzip stream has been finished.
pub fn pack<V, W>(view: &V, writer: W) -> Result<W>
where
    V: TreeView + ?Sized,
    W: Write,
{
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);

    append_dir(view, &mut builder, Path::new(""))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io("finish tar stream", Path::new(""), e))?;
    encoder
        .finish()
        .map_err(|e| Error::io("finish gzip stream", Path::new(""), e))
}

/// Pack `view` into an archive file at `archive_path`.
///
/// The archive is written to `<archive_path>.part` and renamed into place only
/// once packing succeeds. On failure any existing archive is left untouched.
pub fn pack_to_file<V: TreeView + ?Sized>(view: &V, archive_path: &Path) -> Result<()> {
    let part = with_suffix(archive_path.to_path_buf(), ".part");
    let written = write_archive(view, &part)
        .and_then(|_| fs::rename(&part, archive_path).ctx("rename archive", archive_path));
    if written.is_err() {
        let _ = fs::remove_file(&part);
    }
    written
}

fn write_archive<V: TreeView + ?Sized>(view: &V, path: &Path) -> Result<()> {
    let file = File::create(path).ctx("create archive", path)?;
    let writer = pack(view, BufWriter::new(file))?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io("write archive", path, e.into_error()))?;
    file.sync_all().ctx("sync archive", path)
}

fn append_dir<V, W>(view: &V, builder: &mut Builder<W>, rel: &Path) -> Result<()>
where
    V: TreeView + ?Sized,
    W: Write,
{
    let entries = view.read_dir(rel).ctx("list directory", rel)?;

    for entry in entries {
        let child = rel.join(entry.name());
        let name = tar_name(&child)?;

        match entry.kind() {
            EntryKind::Directory => {
                let mut header = canonical_header(tar::EntryType::Directory, 0o755, 0);
                builder
                    .append_data(&mut header, format!("{}/", name), io::empty())
                    .ctx("append directory", &child)?;
                append_dir(view, builder, &child)?;
            }
            EntryKind::File => {
                let metadata = view.stat(&child).ctx("stat", &child)?;
                let mode = if is_executable(&metadata) { 0o755 } else { 0o644 };
                let mut header = canonical_header(tar::EntryType::Regular, mode, metadata.len());
                let file = view.open(&child).ctx("open", &child)?;
                builder
                    .append_data(&mut header, &name, file)
                    .ctx("append file", &child)?;
            }
            EntryKind::Other => {
                return Err(Error::UnsupportedEntryType {
                    path: child,
                    entry_type: "non-regular file".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn canonical_header(entry_type: tar::EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header
}

/// `/`-separated archive name for a relative path
fn tar_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component.as_os_str().to_str() {
            Some(s) => parts.push(s),
            None => {
                return Err(Error::io(
                    "encode archive path",
                    rel,
                    io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
                ))
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

/// Expand a tar.gz stream into `dest`, which must already exist.
///
/// Entries are processed in archive order. A failure part-way leaves the
/// entries written so far in place.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> Result<UnpackStats> {
    if !dest.is_dir() {
        return Err(Error::DestinationMissing(dest.to_path_buf()));
    }

    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut stats = UnpackStats::default();

    for entry in archive.entries().ctx("read archive", dest)? {
        let mut entry = entry.ctx("read archive entry", dest)?;
        let rel = entry
            .path()
            .ctx("decode archive entry path", dest)?
            .into_owned();
        check_entry_path(&rel)?;
        let target = dest.join(&rel);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target).ctx("create directory", &target)?;
                stats.directories += 1;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).ctx("create directory", parent)?;
                }
                let mut file = File::create(&target).ctx("create file", &target)?;
                stats.bytes += io::copy(&mut entry, &mut file).ctx("write file", &target)?;
                stats.files += 1;
            }
            other => {
                return Err(Error::UnsupportedEntryType {
                    path: rel,
                    entry_type: format!("{:?}", other),
                });
            }
        }
    }

    Ok(stats)
}

/// Unpack the archive file at `archive_path` into `dest`.
pub fn unpack_file(archive_path: &Path, dest: &Path) -> Result<UnpackStats> {
    let file = File::open(archive_path).ctx("open archive", archive_path)?;
    unpack(BufReader::new(file), dest)
}

fn check_entry_path(rel: &Path) -> Result<()> {
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::UnsafeEntryPath(PathBuf::from(rel)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("include/png")).unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("include/png/png.h"), "#define PNG 1\n").unwrap();
        fs::write(dir.path().join("lib/libpng.a"), [0u8, 1, 2, 3, 255]).unwrap();
        fs::write(dir.path().join("LICENSE"), "zlib").unwrap();
        dir
    }

    fn archive_entries(bytes: &[u8]) -> Vec<(String, tar::EntryType)> {
        let mut archive = Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.path().unwrap().to_string_lossy().into_owned(),
                    e.header().entry_type(),
                )
            })
            .collect()
    }

    fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| {
                let e = e.unwrap();
                let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
                let content = if e.file_type().is_file() {
                    Some(fs::read(e.path()).unwrap())
                } else {
                    None
                };
                (rel, content)
            })
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let src = create_test_tree();
        let dest = TempDir::new().unwrap();

        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();
        let stats = unpack(bytes.as_slice(), dest.path()).unwrap();

        assert_eq!(snapshot(src.path()), snapshot(dest.path()));
        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 4);
    }

    #[test]
    fn test_pack_is_deterministic() {
        let src = create_test_tree();
        let view = FilteredDir::new(src.path(), Vec::<String>::new());

        let a = pack(&view, Vec::new()).unwrap();
        let b = pack(&view, Vec::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pack_order_and_entry_types() {
        let src = create_test_tree();
        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();

        let names: Vec<_> = archive_entries(&bytes)
            .into_iter()
            .map(|(n, t)| (n.trim_end_matches('/').to_string(), t))
            .collect();
        assert_eq!(
            names,
            vec![
                ("LICENSE".to_string(), tar::EntryType::Regular),
                ("empty".to_string(), tar::EntryType::Directory),
                ("include".to_string(), tar::EntryType::Directory),
                ("include/png".to_string(), tar::EntryType::Directory),
                ("include/png/png.h".to_string(), tar::EntryType::Regular),
                ("lib".to_string(), tar::EntryType::Directory),
                ("lib/libpng.a".to_string(), tar::EntryType::Regular),
            ]
        );
    }

    #[test]
    fn test_pack_skips_excluded_names_at_every_depth() {
        let src = create_test_tree();
        fs::write(src.path().join(".DS_Store"), "x").unwrap();
        fs::write(src.path().join("include/.DS_Store"), "x").unwrap();
        fs::write(src.path().join("include/png/.DS_Store"), "x").unwrap();

        let bytes = pack(&FilteredDir::new(src.path(), [".DS_Store"]), Vec::new()).unwrap();

        assert!(!archive_entries(&bytes)
            .iter()
            .any(|(n, _)| n.ends_with(".DS_Store")));
    }

    #[test]
    fn test_long_paths_survive() {
        let src = TempDir::new().unwrap();
        let deep = src.path().join("a".repeat(60)).join("b".repeat(60));
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("c".repeat(40)), "deep").unwrap();

        let dest = TempDir::new().unwrap();
        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();
        unpack(bytes.as_slice(), dest.path()).unwrap();

        assert_eq!(snapshot(src.path()), snapshot(dest.path()));
    }

    #[test]
    fn test_unpack_requires_destination() {
        let src = create_test_tree();
        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();

        let missing = src.path().join("does-not-exist");
        let err = unpack(bytes.as_slice(), &missing).unwrap_err();
        assert!(matches!(err, Error::DestinationMissing(p) if p == missing));
        assert!(!missing.exists());
    }

    #[test]
    fn test_unpack_is_idempotent_for_directories() {
        let src = create_test_tree();
        let dest = TempDir::new().unwrap();
        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();

        unpack(bytes.as_slice(), dest.path()).unwrap();
        unpack(bytes.as_slice(), dest.path()).unwrap();
        assert_eq!(snapshot(src.path()), snapshot(dest.path()));
    }

    fn archive_with_symlink() -> Vec<u8> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        let mut header = canonical_header(tar::EntryType::Regular, 0o644, 2);
        builder.append_data(&mut header, "first.txt", &b"hi"[..]).unwrap();

        let mut header = canonical_header(tar::EntryType::Symlink, 0o777, 0);
        builder
            .append_link(&mut header, "link", "first.txt")
            .unwrap();

        let mut header = canonical_header(tar::EntryType::Regular, 0o644, 2);
        builder.append_data(&mut header, "after.txt", &b"yo"[..]).unwrap();

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_rejects_symlink_without_rollback() {
        let dest = TempDir::new().unwrap();
        let err = unpack(archive_with_symlink().as_slice(), dest.path()).unwrap_err();

        match err {
            Error::UnsupportedEntryType { path, .. } => assert_eq!(path, Path::new("link")),
            other => panic!("expected UnsupportedEntryType, got {:?}", other),
        }
        // Entries before the failure stay, entries after it are never written
        assert_eq!(fs::read(dest.path().join("first.txt")).unwrap(), b"hi");
        assert!(!dest.path().join("after.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_rejects_symlink() {
        let src = create_test_tree();
        std::os::unix::fs::symlink("LICENSE", src.path().join("COPYING")).unwrap();

        let view = FilteredDir::new(src.path(), Vec::<String>::new());
        let err = pack(&view, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEntryType { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_mode_normalized() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let tool = src.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o700)).unwrap();
        fs::write(src.path().join("data"), "d").unwrap();
        fs::set_permissions(src.path().join("data"), fs::Permissions::from_mode(0o600)).unwrap();

        let bytes = pack(&FilteredDir::new(src.path(), Vec::<String>::new()), Vec::new()).unwrap();
        let mut archive = Archive::new(GzDecoder::new(bytes.as_slice()));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let mode = entry.header().mode().unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            match name.as_str() {
                "tool" => assert_eq!(mode, 0o755),
                "data" => assert_eq!(mode, 0o644),
                other => panic!("unexpected entry {}", other),
            }
            assert_eq!(entry.header().mtime().unwrap(), 0);
        }
    }

    #[test]
    fn test_pack_to_file_and_unpack_file() {
        let src = create_test_tree();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("macos.tar.gz");
        let dest = out.path().join("dest");
        fs::create_dir(&dest).unwrap();

        pack_to_file(&FilteredDir::new(src.path(), Vec::<String>::new()), &archive_path).unwrap();
        unpack_file(&archive_path, &dest).unwrap();

        assert_eq!(snapshot(src.path()), snapshot(&dest));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_pack_keeps_existing_archive() {
        let src = create_test_tree();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("macos.tar.gz");
        let view = FilteredDir::new(src.path(), Vec::<String>::new());

        pack_to_file(&view, &archive_path).unwrap();
        let before = fs::read(&archive_path).unwrap();

        std::os::unix::fs::symlink("LICENSE", src.path().join("COPYING")).unwrap();
        let err = pack_to_file(&view, &archive_path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEntryType { .. }));

        assert_eq!(fs::read(&archive_path).unwrap(), before);
        assert!(!out.path().join("macos.tar.gz.part").exists());
    }

    #[test]
    fn test_unpack_rejects_parent_dir_entries() {
        // Header bytes are written by hand; the builder refuses `..` names
        let mut header = canonical_header(tar::EntryType::Regular, 0o644, 1);
        header.as_old_mut().name[..9].copy_from_slice(b"../evil\0\0");
        header.set_cksum();
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder.append(&header, &b"x"[..]).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let dest = TempDir::new().unwrap();
        let err = unpack(bytes.as_slice(), dest.path()).unwrap_err();
        assert!(matches!(err, Error::UnsafeEntryPath(_)));
    }
}
