//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{CacheMode, KilnConfig};
use std::path::Path;

/// Name of the configuration file within a project directory.
const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `<project_dir>/kiln.toml`.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    let content = std::fs::read_to_string(project_dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.cache.mode == CacheMode::Lru && config.cache.lru_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "cache.lru_capacity must be > 0".to_string(),
        ));
    }
    if let Some(filter) = &config.logging.filter {
        if filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.filter must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyKind;

    #[test]
    fn empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.cache.mode, CacheMode::Hierarchical);
        assert_eq!(config.cache.key, KeyKind::InputSignature);
        assert_eq!(config.cache.lru_capacity, 100);
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
mode = "lru"
key = "identity"
include_node_id = true
lru_capacity = 8

[logging]
filter = "kiln_cache=debug"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.mode, CacheMode::Lru);
        assert_eq!(config.cache.key, KeyKind::Identity);
        assert!(config.cache.include_node_id);
        assert_eq!(config.cache.lru_capacity, 8);
        assert_eq!(config.logging.filter.as_deref(), Some("kiln_cache=debug"));
    }

    #[test]
    fn zero_lru_capacity_rejected() {
        let toml = r#"
[cache]
mode = "lru"
lru_capacity = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_capacity_ignored_for_hierarchical() {
        let toml = r#"
[cache]
lru_capacity = 0
"#;
        assert!(load_config_from_str(toml).is_ok());
    }

    #[test]
    fn blank_filter_rejected() {
        let err = load_config_from_str("[logging]\nfilter = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "[cache]\nmode = \"lru\"\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache.mode, CacheMode::Lru);
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
