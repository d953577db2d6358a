//! Writing configuration files.
//!
//! # Configuration File Format
//!
//! ```toml
//! [http]
//! endpoint = "https://proteomic.datacommons.cancer.gov/graphql"
//! timeout_seconds = 10
//! retries = 3
//!
//! [rate_limits]
//! interval_seconds = 0.5
//!
//! [downloads]
//! max_concurrent = 5
//! directory = "./downloads"
//!
//! [cache]
//! directory = "~/.cache/pdc-harvest"
//!
//! [diagnostics]
//! path = "error.txt"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use std::path::Path;

use super::Config;

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Config file already exists: {0}")]
    AlreadyExists(String),
}

impl Config {
    /// Render this configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))
    }

    /// Save this configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

/// Write the default configuration to `path`, refusing to overwrite unless `force`
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigFileError> {
    if path.exists() && !force {
        return Err(ConfigFileError::AlreadyExists(path.display().to_string()));
    }

    Config::default().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.rate_limits.interval_seconds = 2.0;
        config.downloads.max_concurrent = 8;

        config.save(&path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.rate_limits.interval_seconds, 2.0);
        assert_eq!(loaded.downloads.max_concurrent, 8);
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path, false).unwrap();
        assert!(path.is_file());

        let result = write_default_config(&path, false);
        assert!(matches!(result, Err(ConfigFileError::AlreadyExists(_))));

        write_default_config(&path, true).unwrap();
    }
}
