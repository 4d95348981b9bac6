//! SHA-256 checksum sidecars
//!
//! A sidecar holds the lowercase hex digest of its archive, with no
//! newline or wrapping. Sidecars are compared as raw bytes.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::{IoContext, Result};

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file's bytes as they are on disk
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).ctx("open for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).ctx("read for hashing", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Read a sidecar verbatim.
pub fn read_checksum(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).ctx("read checksum", path)
}

pub fn write_checksum(path: &Path, checksum: &[u8]) -> Result<()> {
    fs::write(path, checksum).ctx("write checksum", path)
}
