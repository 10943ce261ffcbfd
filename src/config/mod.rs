//! Configuration for kvstage.
//!
//! ## config.kdl - User preferences
//!
//! Located at `$KVSTAGE_CONFIG_DIR/config.kdl`, or
//! `<platform config dir>/kvstage/config.kdl` when the variable is unset
//! (e.g. `~/.config/kvstage/config.kdl`).
//!
//! Contains:
//! - `output-format` - "json" or "human"
//! - `concurrency` - maximum remote calls in flight during push (1-64)
//! - `remote-dir` - directory backing the local remote
//!
//! A missing file is the same as an empty one.
//!
//! ## Precedence
//!
//! CLI flag > environment > config.kdl > defaults. Use the [`resolver`]
//! module for resolution with source tracking.

pub mod resolver;
pub mod schema;

pub use resolver::{ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve_config};
pub use schema::{KvstageConfig, OutputFormat};

use crate::{Error, Result};
use kdl::KdlDocument;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "KVSTAGE_CONFIG_DIR";

/// Environment variable overriding the local remote directory.
pub const REMOTE_DIR_ENV: &str = "KVSTAGE_REMOTE_DIR";

/// Name of the config file inside the config directory.
pub const CONFIG_FILE: &str = "config.kdl";

/// Directory holding config.kdl.
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("kvstage"))
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))
}

/// Load config.kdl from the config directory.
pub fn load_config() -> Result<KvstageConfig> {
    load_config_file(&get_config_dir()?.join(CONFIG_FILE))
}

/// Load a config file, treating a missing file as empty.
pub fn load_config_file(path: &Path) -> Result<KvstageConfig> {
    if !path.exists() {
        return Ok(KvstageConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

    KvstageConfig::from_kdl(&doc)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let config = load_config_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, KvstageConfig::default());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "output-format \"human\"\nconcurrency 5\n").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.output_format, Some(OutputFormat::Human));
        assert_eq!(config.concurrency, Some(5));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "concurrency {{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_invalid_value_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "concurrency 100").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));
        assert!(err.to_string().contains("concurrency must be 1-64"));
    }
}
