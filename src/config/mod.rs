//! Configuration management for the Keel host
//!
//! Precedence: command line / environment > config file > defaults. The
//! resolved [`Config`] is handed to the application host explicitly; nothing
//! here writes to the process environment.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::plugins::DEFAULT_ENTRY_FILE;
use crate::{Error, Result};

pub use file::KeelConfigFile;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8000;

/// Default per-probe time limit
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keel host configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Plugins root directory
    pub plugins_dir: PathBuf,

    /// Entry file that marks a plugin directory
    pub entry_file: String,

    /// Database URL; `None` runs without a database
    pub database_url: Option<String>,

    /// Directory essential files and the lockfile are resolved against
    pub base_dir: PathBuf,

    /// Lockfile consulted for package versions (relative to `base_dir`)
    pub lockfile: PathBuf,

    /// Time limit for each health probe
    pub probe_timeout: Duration,

    /// What the health report checks
    pub health: HealthConfig,
}

/// Inputs to the health probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Environment variables that must be set
    pub required_env: Vec<String>,

    /// Core module identifiers resolved by the import probe
    pub core_modules: Vec<String>,

    /// Paths (relative to `base_dir`) that must exist
    pub essential_files: Vec<String>,

    /// Dependency packages whose versions are reported
    pub core_packages: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            required_env: strings(&["DATABASE_URL"]),
            core_modules: strings(&[
                "db.schema",
                "db.models",
                "plugins.registry",
                "plugins.sanitization",
            ]),
            essential_files: strings(&["Cargo.toml", "src/lib.rs", "src/main.rs"]),
            core_packages: strings(&["axum", "tokio", "rusqlite"]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            plugins_dir: PathBuf::from("plugins"),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            database_url: None,
            base_dir: PathBuf::from("."),
            lockfile: PathBuf::from("Cargo.lock"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            health: HealthConfig::default(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub plugins_dir: Option<PathBuf>,
    pub entry_file: Option<String>,
    pub database_url: Option<String>,
    pub base_dir: Option<PathBuf>,
    pub probe_timeout_ms: Option<u64>,
}

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    File(PathBuf),
    Memory,
}

impl Config {
    /// Load configuration from an optional config file plus overrides
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be loaded
    pub fn load(overrides: ConfigOverrides, config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Ok(Self::resolve(overrides, fc))
    }

    /// Merge overrides and a parsed config file over the defaults
    #[must_use]
    pub fn resolve(overrides: ConfigOverrides, fc: KeelConfigFile) -> Self {
        let defaults = Self::default();
        let health_defaults = defaults.health;

        let probe_timeout = overrides
            .probe_timeout_ms
            .or(fc.health.probe_timeout_ms)
            .map_or(defaults.probe_timeout, Duration::from_millis);

        Self {
            host: overrides.host.or(fc.server.host).unwrap_or(defaults.host),
            port: overrides.port.or(fc.server.port).unwrap_or(defaults.port),
            plugins_dir: overrides
                .plugins_dir
                .or(fc.plugins.dir)
                .unwrap_or(defaults.plugins_dir),
            entry_file: overrides
                .entry_file
                .or(fc.plugins.entry_file)
                .unwrap_or(defaults.entry_file),
            database_url: overrides
                .database_url
                .or(fc.database.url)
                .filter(|url| !url.trim().is_empty()),
            base_dir: overrides
                .base_dir
                .or(fc.health.base_dir)
                .unwrap_or(defaults.base_dir),
            lockfile: fc.health.lockfile.unwrap_or(defaults.lockfile),
            probe_timeout,
            health: HealthConfig {
                required_env: fc.health.required_env.unwrap_or(health_defaults.required_env),
                core_modules: fc.health.core_modules.unwrap_or(health_defaults.core_modules),
                essential_files: fc
                    .health
                    .essential_files
                    .unwrap_or(health_defaults.essential_files),
                core_packages: fc
                    .health
                    .core_packages
                    .unwrap_or(health_defaults.core_packages),
            },
        }
    }

    /// Lockfile path resolved against `base_dir`
    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.base_dir.join(&self.lockfile)
    }

    /// Listen address as `host:port`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed database target, if a database is configured
    ///
    /// # Errors
    ///
    /// Returns error if the URL names an unsupported backend
    pub fn database(&self) -> Result<Option<DatabaseTarget>> {
        self.database_url
            .as_deref()
            .map(parse_database_url)
            .transpose()
    }
}

/// Parse `sqlite://path`, `sqlite:path`, `:memory:` or a bare path
///
/// # Errors
///
/// Returns error for any other URL scheme
pub fn parse_database_url(url: &str) -> Result<DatabaseTarget> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        let scheme = url.split("://").next().unwrap_or_default();
        return Err(Error::Config(format!(
            "unsupported database scheme '{scheme}', only sqlite is available"
        )));
    } else {
        url
    };

    match path {
        "" | ":memory:" => Ok(DatabaseTarget::Memory),
        path => Ok(DatabaseTarget::File(PathBuf::from(path))),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
