//! Configuration
//!
//! Three layers, later ones winning:
//! 1. Built-in defaults
//! 2. Config file (`deptool.toml`, or the path given with `--config`)
//! 3. CLI flags
//!
//! Relative paths in a config file are resolved against the file's directory.

mod defaults;

pub use defaults::{BuiltinDefaults, DEFAULT_CONFIG_FILE};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::DepsLayout;
use crate::sync::DirObjectStore;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[store]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    root: Option<PathBuf>,
}

/// On-disk config file shape; every key optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    deps_dir: Option<PathBuf>,
    excluded_filenames: Option<Vec<String>>,
    store: Option<StoreSection>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub deps_dir: Option<PathBuf>,
    pub store_root: Option<PathBuf>,
}

/// Effective configuration after merging all layers
#[derive(Debug, Clone, Serialize)]
pub struct DeptoolConfig {
    pub deps_dir: PathBuf,
    pub store_root: PathBuf,
    pub excluded_filenames: Vec<String>,
    /// Config file that contributed, if any
    pub source: Option<PathBuf>,
}

impl Default for DeptoolConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            deps_dir: defaults.deps_dir,
            store_root: defaults.store_root,
            excluded_filenames: defaults.excluded_filenames,
            source: None,
        }
    }
}

impl DeptoolConfig {
    /// Load configuration.
    ///
    /// An explicit `config_path` must exist. Without one, `deptool.toml` in
    /// the working directory is used when present.
    pub fn load(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match config_path {
            Some(path) => config.apply_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    config.apply_file(path)?;
                }
            }
        }

        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a config document, resolving relative paths against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_document(contents, base_dir, Path::new("<string>"))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.apply_document(&contents, base_dir, path)?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn apply_document(
        &mut self,
        contents: &str,
        base_dir: &Path,
        origin: &Path,
    ) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(deps_dir) = file.deps_dir {
            self.deps_dir = base_dir.join(deps_dir);
        }
        if let Some(root) = file.store.and_then(|s| s.root) {
            self.store_root = base_dir.join(root);
        }
        if let Some(excluded) = file.excluded_filenames {
            self.excluded_filenames = excluded;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(deps_dir) = &overrides.deps_dir {
            self.deps_dir = deps_dir.clone();
        }
        if let Some(store_root) = &overrides.store_root {
            self.store_root = store_root.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.deps_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("deps_dir must not be empty".to_string()));
        }
        if self.store_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.root must not be empty".to_string()));
        }
        if let Some(bad) = self
            .excluded_filenames
            .iter()
            .find(|n| n.is_empty() || n.contains('/') || n.contains('\\'))
        {
            return Err(ConfigError::Invalid(format!(
                "excluded_filenames entries must be bare filenames, got {:?}",
                bad
            )));
        }
        Ok(())
    }

    pub fn layout(&self) -> DepsLayout {
        DepsLayout::new(&self.deps_dir)
    }

    pub fn object_store(&self) -> DirObjectStore {
        DirObjectStore::new(&self.store_root)
    }
}
