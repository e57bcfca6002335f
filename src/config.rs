//! Store configuration.
//!
//! A store is addressed by a directory on disk. The defaults suit a single
//! inspector device; `map_size` bounds the total size of checklists plus images
//! and can be raised in a TOML file:
//!
//! ```toml
//! path = "inspections.lmdb"
//! map_size = 2147483648
//! max_readers = 64
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_READERS: u32 = 126;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the LMDB environment. Created if missing.
    pub path: PathBuf,
    /// Upper bound of the memory map in bytes.
    pub map_size: usize,
    pub max_readers: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("checklists.lmdb"),
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
        }
    }
}

impl StoreConfig {
    /// Config for a database called `name`, stored in `<name>.lmdb`.
    pub fn named(name: &str) -> Self {
        Self {
            path: PathBuf::from(format!("{name}.lmdb")),
            ..Self::default()
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_appends_lmdb_suffix() {
        let config = StoreConfig::named("site_a");
        assert_eq!(config.path, PathBuf::from("site_a.lmdb"));
        assert_eq!(config.map_size, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = StoreConfig::from_toml_str(r#"path = "/tmp/insp.lmdb""#).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/insp.lmdb"));
        assert_eq!(config.max_readers, DEFAULT_MAX_READERS);
    }

    #[test]
    fn toml_rejects_wrong_types() {
        let err = StoreConfig::from_toml_str("map_size = \"big\"").unwrap_err();
        assert!(matches!(err, crate::error::StoreError::Config(_)));
    }
}
