//! Built-in defaults (layer 1)

use std::path::PathBuf;

use crate::sync::DEFAULT_EXCLUDED_FILENAMES;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "deptool.toml";

/// Built-in default configuration values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    /// Dependencies root (default: "deps")
    pub deps_dir: PathBuf,

    /// Directory backing the object store (default: "object-store")
    pub store_root: PathBuf,

    /// Filenames kept out of archives (default: [".DS_Store"])
    pub excluded_filenames: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            deps_dir: PathBuf::from("deps"),
            store_root: PathBuf::from("object-store"),
            excluded_filenames: DEFAULT_EXCLUDED_FILENAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
