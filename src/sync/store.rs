//! Object storage collaborator
//!
//! Remote sync only needs two calls from a bucket: fetch an object as a
//! byte stream and store a byte stream under a key. The S3-compatible client
//! used in CI implements [`ObjectStore`] outside this crate. Two in-tree
//! implementations are provided:
//! - [`DirObjectStore`]: a bucket laid out on a local directory
//! - [`MemoryObjectStore`]: an in-process bucket for tests

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Object storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A key/value bucket addressed by `/`-separated keys
///
/// Implementations own transport concerns such as timeouts and retries.
pub trait ObjectStore: Send + Sync {
    /// Open the object stored at `key` for reading
    fn download(&self, key: &str) -> Result<Box<dyn Read + '_>, StoreError>;

    /// Store everything read from `body` under `key`, replacing any previous object
    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<(), StoreError>;
}

/// Split a key into segments, rejecting anything that is not a plain relative path.
fn key_segments(key: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = key.split('/').collect();
    let bad = segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'));
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// Bucket backed by a directory tree
///
/// The object `a/b/c.tar.gz` lives at `<root>/a/b/c.tar.gz`. Uploads are
/// written to a temp file in the destination directory and renamed into
/// place, so readers never see a partial object.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectStore for DirObjectStore {
    fn download(&self, key: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        let path = self.object_path(key)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(dir)?;

        let temp_path = dir.join(format!(".tmp.{}", Uuid::new_v4().simple()));
        let written = (|| -> io::Result<()> {
            let mut file = File::create(&temp_path)?;
            io::copy(body, &mut file)?;
            file.flush()?;
            file.sync_all()
        })();

        if let Err(e) = written.and_then(|_| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

/// In-process bucket
///
/// Records every upload and download key in call order and can be told to
/// fail specific keys.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<BTreeSet<String>>,
    uploads: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(key.into(), bytes.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Make every later download or upload of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        lock(&self.failing).insert(key.into());
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        lock(&self.uploads).clone()
    }

    pub fn downloaded_keys(&self) -> Vec<String> {
        lock(&self.downloads).clone()
    }

    fn check_failing(&self, key: &str) -> Result<(), StoreError> {
        if lock(&self.failing).contains(key) {
            return Err(StoreError::Backend(format!("injected failure for {}", key)));
        }
        Ok(())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn download(&self, key: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        key_segments(key)?;
        lock(&self.downloads).push(key.to_string());
        self.check_failing(key)?;
        let bytes = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<(), StoreError> {
        key_segments(key)?;
        lock(&self.uploads).push(key.to_string());
        self.check_failing(key)?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        self.insert(key, bytes);
        Ok(())
    }
}
