//! Read-only directory view that hides selected filenames from listings
//!
//! Hiding only applies to [`TreeView::read_dir`]. Opening or stat-ing an
//! excluded file by name still works; the view controls what a walker sees,
//! it does not deny access.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Kind of an entry as reported by a directory listing (symlinks not followed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Symlinks, sockets, devices and anything else
    Other,
}

/// One child of a listed directory
#[derive(Debug, Clone)]
pub struct TreeEntry {
    name: OsString,
    kind: EntryKind,
}

impl TreeEntry {
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }
}

/// A tree that can be walked by relative path
///
/// Paths are relative to the view's root; the empty path is the root itself.
pub trait TreeView {
    /// List a directory, sorted by filename
    fn read_dir(&self, rel: &Path) -> io::Result<Vec<TreeEntry>>;

    fn stat(&self, rel: &Path) -> io::Result<Metadata>;

    fn open(&self, rel: &Path) -> io::Result<File>;

    fn read(&self, rel: &Path) -> io::Result<Vec<u8>>;
}

/// A directory on disk with some filenames filtered out of listings
#[derive(Debug, Clone)]
pub struct FilteredDir {
    root: PathBuf,
    excluded: Vec<String>,
}

impl FilteredDir {
    pub fn new<I, S>(root: impl Into<PathBuf>, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, name: &OsStr) -> bool {
        self.excluded.iter().any(|e| OsStr::new(e) == name)
    }

    /// Resolve a relative path under the root.
    fn join(&self, rel: &Path) -> io::Result<PathBuf> {
        if self.root.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "filtered directory view with empty root",
            ));
        }
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not relative to view root: {}", rel.display()),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl TreeView for FilteredDir {
    fn read_dir(&self, rel: &Path) -> io::Result<Vec<TreeEntry>> {
        let full = self.join(rel)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let name = entry.file_name();
            if self.is_excluded(&name) {
                continue;
            }

            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(TreeEntry { name, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, rel: &Path) -> io::Result<Metadata> {
        fs::metadata(self.join(rel)?)
    }

    fn open(&self, rel: &Path) -> io::Result<File> {
        File::open(self.join(rel)?)
    }

    fn read(&self, rel: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.join(rel)?)
    }
}
