//! Individual health probes
//!
//! Every probe is a blocking function that turns its own failures into data;
//! none of them return `Err`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::env::EnvSource;
use super::{ProbeResult, ProbeStatus};
use crate::db::{DbPool, ModelRegistry};
use crate::modules::ModuleCatalog;
use crate::plugins::{PluginDescriptor, PluginManifest, PluginRegistry, discover};
use crate::{Error, Result};

/// Accumulates per-key outcomes into a [`ProbeResult`]
#[derive(Default)]
struct Tally {
    details: BTreeMap<String, String>,
    lines: Vec<String>,
    failed: bool,
}

impl Tally {
    fn ok(&mut self, key: &str, line: String) {
        self.details.insert(key.to_string(), "ok".to_string());
        self.lines.push(line);
    }

    fn fail(&mut self, key: &str, reason: &str, line: String) {
        self.details.insert(key.to_string(), format!("error: {reason}"));
        self.lines.push(line);
        self.failed = true;
    }

    fn finish(self, empty_summary: &str, empty_status: ProbeStatus) -> ProbeResult {
        if self.lines.is_empty() {
            return ProbeResult::new(empty_status, empty_summary);
        }
        let status = if self.failed {
            ProbeStatus::Error
        } else {
            ProbeStatus::Ok
        };
        ProbeResult {
            summary: self.lines.join("\n"),
            status,
            details: self.details,
        }
    }
}

/// Report each required variable as set or `NOT SET`
pub fn check_env_vars(env: &dyn EnvSource, required: &[String]) -> ProbeResult {
    let mut details = BTreeMap::new();
    let mut missing = Vec::new();

    for name in required {
        match env.var(name) {
            Some(value) => {
                details.insert(name.clone(), value);
            }
            None => {
                details.insert(name.clone(), "NOT SET".to_string());
                missing.push(name.as_str());
            }
        }
    }

    if missing.is_empty() {
        ProbeResult {
            summary: "All required environment variables are set.".to_string(),
            status: ProbeStatus::Ok,
            details,
        }
    } else {
        ProbeResult {
            summary: format!("Missing environment variables: {}", missing.join(", ")),
            status: ProbeStatus::Missing,
            details,
        }
    }
}

/// Resolve each core module against the catalog
pub fn check_imports(catalog: &ModuleCatalog, modules: &[String]) -> ProbeResult {
    let mut tally = Tally::default();
    for name in modules {
        match catalog.resolve(name) {
            Ok(()) => tally.ok(name, format!("Module '{name}' imported successfully.")),
            Err(e) => {
                let reason = e.to_string();
                tally.fail(name, &reason, format!("Module '{name}' import failed: {reason}"));
            }
        }
    }
    tally.finish("No core modules configured.", ProbeStatus::Ok)
}

/// Run `SELECT 1` on a pooled connection
pub fn check_database(db: Option<&DbPool>) -> ProbeResult {
    let Some(pool) = db else {
        return ProbeResult::new(ProbeStatus::NoDb, "No database session available.");
    };

    match ping(pool) {
        Ok(()) => ProbeResult::new(ProbeStatus::Ok, "Database connection successful."),
        Err(e) => ProbeResult::new(
            ProbeStatus::Error,
            format!("Database connection failed: {e}"),
        )
        .with_detail("error", e.to_string()),
    }
}

fn ping(pool: &DbPool) -> Result<()> {
    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    conn.query_row("SELECT 1", [], |_| Ok(()))?;
    Ok(())
}

/// Count rows in every registered table
pub fn check_models(db: Option<&DbPool>, models: &ModelRegistry) -> ProbeResult {
    if models.is_empty() {
        return ProbeResult::new(ProbeStatus::Skipped, "No model checks performed.");
    }
    let Some(pool) = db else {
        return ProbeResult::new(
            ProbeStatus::Skipped,
            "No database session available; model checks skipped.",
        );
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            return ProbeResult::new(
                ProbeStatus::Error,
                format!("Could not acquire a database connection: {e}"),
            )
            .with_detail("error", e.to_string());
        }
    };

    let mut tally = Tally::default();
    for table in models.tables() {
        match crate::db::count_rows(&conn, table) {
            Ok(_) => tally.ok(table, format!("Table '{table}' accessible.")),
            Err(e) => {
                let reason = e.to_string();
                tally.fail(table, &reason, format!("Table '{table}' inaccessible: {reason}"));
            }
        }
    }
    tally.finish("No model checks performed.", ProbeStatus::Skipped)
}

/// Result of the plugin re-import probe
#[derive(Debug, Clone)]
pub struct PluginsCheck {
    /// Names found by a fresh discovery run
    pub found: Vec<String>,
    /// Per-plugin importability
    pub result: ProbeResult,
}

/// Rediscover plugins and re-resolve each one
///
/// A plugin resolves when its entry file still parses and the registry still
/// holds code for it. Runs regardless of how the startup load went.
pub fn check_plugins_importable(
    plugins_dir: &Path,
    entry_file: &str,
    registry: &PluginRegistry,
) -> PluginsCheck {
    let descriptors = match discover(plugins_dir, entry_file) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            return PluginsCheck {
                found: Vec::new(),
                result: ProbeResult::new(
                    ProbeStatus::Error,
                    format!("Plugin discovery failed: {e}"),
                ),
            };
        }
    };

    let mut tally = Tally::default();
    for descriptor in &descriptors {
        let name = &descriptor.name;
        match reimport(descriptor, registry) {
            Ok(()) => tally.ok(name, format!("Plugin '{name}' imported successfully.")),
            Err(e) => {
                let reason = e.to_string();
                tally.fail(name, &reason, format!("Plugin '{name}' import failed: {reason}"));
            }
        }
    }

    PluginsCheck {
        found: descriptors.into_iter().map(|d| d.name).collect(),
        result: tally.finish("No plugins found.", ProbeStatus::Ok),
    }
}

fn reimport(descriptor: &PluginDescriptor, registry: &PluginRegistry) -> Result<()> {
    PluginManifest::load(&descriptor.entry_point)?;
    if !registry.contains(&descriptor.name) {
        return Err(Error::PluginLoad {
            name: descriptor.name.clone(),
            reason: "no plugin registered under this name".to_string(),
        });
    }
    Ok(())
}

/// Existence of each essential file
#[derive(Debug, Clone, Default)]
pub struct FilesCheck {
    pub present: BTreeMap<String, bool>,
    pub summary: String,
}

impl FilesCheck {
    /// Whether every file exists
    #[must_use]
    pub fn all_present(&self) -> bool {
        self.present.values().all(|exists| *exists)
    }
}

/// Check that each path (relative to `base_dir`) exists
pub fn check_files(base_dir: &Path, files: &[String]) -> FilesCheck {
    let mut present = BTreeMap::new();
    let mut lines = Vec::with_capacity(files.len());

    for file in files {
        let exists = base_dir.join(file).exists();
        if exists {
            lines.push(format!("File '{file}' found."));
        } else {
            lines.push(format!("File '{file}' NOT FOUND."));
        }
        present.insert(file.clone(), exists);
    }

    FilesCheck {
        present,
        summary: lines.join("\n"),
    }
}

/// Host runtime description
#[must_use]
pub fn runtime_version() -> String {
    format!(
        "{} {} ({}/{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Versions of the core dependency packages
#[derive(Debug, Clone, Default)]
pub struct PackagesCheck {
    pub versions: BTreeMap<String, String>,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct Lockfile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    version: String,
}

fn read_lockfile(path: &Path) -> Result<Vec<LockedPackage>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Probe(format!("failed to read {}: {e}", path.display()))
    })?;
    let lockfile: Lockfile = toml::from_str(&content)?;
    Ok(lockfile.package)
}

/// Look up each package's version in `Cargo.lock`
pub fn check_packages(lockfile: &Path, packages: &[String]) -> PackagesCheck {
    let locked = read_lockfile(lockfile);
    let mut versions = BTreeMap::new();
    let mut lines = Vec::with_capacity(packages.len());

    for name in packages {
        let lookup = match &locked {
            Ok(locked) => {
                let found: Vec<&str> = locked
                    .iter()
                    .filter(|p| p.name == *name)
                    .map(|p| p.version.as_str())
                    .collect();
                if found.is_empty() {
                    Err(format!("package '{name}' not found in lockfile"))
                } else {
                    Ok(found.join(", "))
                }
            }
            Err(e) => Err(e.to_string()),
        };

        match lookup {
            Ok(version) => {
                lines.push(format!("Package '{name}' version {version} installed."));
                versions.insert(name.clone(), version);
            }
            Err(reason) => {
                lines.push(format!("Package '{name}' NOT FOUND: {reason}"));
                versions.insert(name.clone(), format!("missing ({reason})"));
            }
        }
    }

    PackagesCheck {
        versions,
        summary: lines.join("\n"),
    }
}
