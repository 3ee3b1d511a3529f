//! TOML configuration file loading
//!
//! Supports `~/.config/keel/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KeelConfigFile {
    /// Server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Plugin discovery configuration
    #[serde(default)]
    pub plugins: PluginsFileConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseFileConfig,

    /// Health check configuration
    #[serde(default)]
    pub health: HealthFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,
}

/// Plugin discovery configuration
#[derive(Debug, Default, Deserialize)]
pub struct PluginsFileConfig {
    /// Plugins root directory
    pub dir: Option<PathBuf>,

    /// Entry file name that marks a plugin directory
    pub entry_file: Option<String>,
}

/// Database configuration
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseFileConfig {
    /// `sqlite://path`, a bare path, or `:memory:`
    pub url: Option<String>,
}

/// Health check configuration
#[derive(Debug, Default, Deserialize)]
pub struct HealthFileConfig {
    /// Directory essential files and the lockfile are resolved against
    pub base_dir: Option<PathBuf>,
    /// Lockfile consulted for package versions
    pub lockfile: Option<PathBuf>,
    /// Per-probe time limit in milliseconds
    pub probe_timeout_ms: Option<u64>,
    pub required_env: Option<Vec<String>>,
    pub core_modules: Option<Vec<String>>,
    pub essential_files: Option<Vec<String>>,
    pub core_packages: Option<Vec<String>>,
}

/// Load the config file
///
/// With an explicit `path` the file must exist. Without one, the standard
/// path is used if present and defaults otherwise.
///
/// # Errors
///
/// Returns error if an explicit file is missing, or any file cannot be read
/// or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<KeelConfigFile> {
    let path = match path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match config_file_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(KeelConfigFile::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/keel/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("keel").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let config: KeelConfigFile = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [plugins]
            dir = "/srv/keel/plugins"
            entry_file = "__main__.toml"

            [database]
            url = "sqlite:///var/lib/keel/keel.db"

            [health]
            probe_timeout_ms = 250
            required_env = ["DATABASE_URL", "API_TOKEN"]
            essential_files = ["Cargo.toml"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.plugins.entry_file.as_deref(), Some("__main__.toml"));
        assert_eq!(config.health.probe_timeout_ms, Some(250));
        assert_eq!(config.health.required_env.unwrap().len(), 2);
        assert!(config.health.core_modules.is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: KeelConfigFile = toml::from_str("").unwrap();
        assert!(config.server.port.is_none());
        assert!(config.database.url.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_file(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn explicit_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = 1").unwrap();
        assert!(matches!(
            load_config_file(Some(&path)),
            Err(Error::Config(_))
        ));
    }
}
