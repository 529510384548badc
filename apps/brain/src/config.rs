//! # Configuration Loading
//!
//! Reads `BrainConfig` from TOML. An explicit `--config` path must exist;
//! otherwise `brain.toml` in the working directory is used when present,
//! and built-in defaults when not.

use brain_core::{BrainConfig, BrainError, StorageBackend};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "brain.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Parse a TOML document. Missing sections and keys take their defaults.
pub fn parse(text: &str) -> Result<BrainConfig, BrainError> {
    let config: BrainConfig =
        toml::from_str(text).map_err(|e| BrainError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration for this invocation.
pub fn load(explicit: Option<&Path>) -> Result<BrainConfig, BrainError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.is_file() {
                tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                return Ok(BrainConfig::default());
            }
            fallback
        }
    };

    let metadata = std::fs::metadata(&path).map_err(|e| {
        BrainError::Config(format!("Cannot read config '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(BrainError::Config(format!(
            "Config file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_CONFIG_FILE_SIZE
        )));
    }

    let text = std::fs::read_to_string(&path).map_err(|e| {
        BrainError::Config(format!("Cannot read config '{}': {}", path.display(), e))
    })?;
    let config = parse(&text)?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Apply command-line overrides on top of the file configuration.
pub fn apply_overrides(
    mut config: BrainConfig,
    database: Option<PathBuf>,
    backend: Option<&str>,
) -> Result<BrainConfig, BrainError> {
    if let Some(path) = database {
        config.storage.path = path;
    }
    if let Some(backend) = backend {
        config.storage.backend = match backend {
            "redb" => StorageBackend::Redb,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(BrainError::Config(format!(
                    "Unknown storage backend '{other}' (expected redb or memory)"
                )));
            }
        };
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse("").expect("parse"), BrainConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse(
            r#"
            [storage]
            backend = "memory"

            [learn]
            max_auto_links = 2

            [prune]
            keep_deltas = 20
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.learn.max_auto_links, 2);
        assert_eq!(config.learn.temporal_window_secs, 3600);
        assert_eq!(config.prune.keep_deltas, Some(20));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            parse("[query]\nlimit = 0\n"),
            Err(BrainError::Config(_))
        ));
        assert!(matches!(parse("[query\n"), Err(BrainError::Config(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let missing = temp.path().join("nope.toml");
        assert!(load(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_file_is_read() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("brain.toml");
        std::fs::write(&path, "[query]\nlimit = 9\n").expect("write");
        assert_eq!(load(Some(&path)).expect("load").query.limit, 9);
    }

    #[test]
    fn overrides_replace_storage_settings() {
        let config = apply_overrides(
            BrainConfig::default(),
            Some(PathBuf::from("/tmp/x.redb")),
            Some("memory"),
        )
        .expect("overrides");
        assert_eq!(config.storage.path, PathBuf::from("/tmp/x.redb"));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(apply_overrides(BrainConfig::default(), None, Some("file")).is_err());
    }
}
