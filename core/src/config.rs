//! Application configuration loading.
//!
//! Settings live in a single `config.toml` under the platform config
//! directory. A missing file is not an error; every field has a default, so
//! first launch works without any setup.

use std::fs;
use std::path::{Path, PathBuf};

use edco_types::AppConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Default location of the config file, `<config_dir>/edco/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("edco").join("config.toml"))
}

/// Default location of the site database, `<data_dir>/edco/sites.db`.
pub fn default_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("edco").join("sites.db"))
}

/// Load the configuration from the default path. A missing config directory
/// or file yields the defaults.
pub fn load() -> Result<AppConfig, ConfigError> {
    match default_config_path() {
        Some(path) => load_from(&path),
        None => Ok(AppConfig::default()),
    }
}

/// Load the configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Resolve the configured journal directory, expanding a leading `~`.
pub fn journal_directory(config: &AppConfig) -> PathBuf {
    let raw = config.journal.directory.as_str();
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("config.toml")).unwrap();
        assert!(!config.enrichment.enabled);
    }

    #[test]
    fn file_contents_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[journal]\ndirectory = \"/tmp/journals\"").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.journal.directory, "/tmp/journals");
        assert_eq!(journal_directory(&config), PathBuf::from("/tmp/journals"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "journal = 7").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
