//! Composite health reporting
//!
//! Each request runs every probe from scratch: plugin discovery, environment,
//! core modules, database, tables, essential files, routes and packages.
//! Probes run concurrently on the blocking pool, each bounded by the
//! configured probe timeout, and none of them can fail the request: a probe
//! that errors, panics or times out shows up as `status: "error"`.
//!
//! Overall status gates on environment, core modules, database, models,
//! plugin re-import and essential files. A probe passes with `ok`, `no-db`
//! or `skipped`; routes, runtime and package versions are informational.

mod env;
pub mod probes;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use env::{EnvSource, ProcessEnv};
use probes::{FilesCheck, PackagesCheck, PluginsCheck};

use crate::config::HealthConfig;
use crate::db::{DbPool, ModelRegistry};
use crate::host::{HostServices, RouteRecord, RouteTable};
use crate::modules::ModuleCatalog;
use crate::plugins::PluginRegistry;

/// Status of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStatus {
    Ok,
    Missing,
    Error,
    NoDb,
    Skipped,
}

impl ProbeStatus {
    /// Whether this status lets the overall status stay `ok`
    #[must_use]
    pub const fn passes(self) -> bool {
        matches!(self, Self::Ok | Self::NoDb | Self::Skipped)
    }
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub summary: String,
    pub status: ProbeStatus,
    pub details: BTreeMap<String, String>,
}

impl ProbeResult {
    /// Result with no details
    pub fn new(status: ProbeStatus, summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            status,
            details: BTreeMap::new(),
        }
    }

    /// Probe-level failure
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(ProbeStatus::Error, summary)
    }

    /// Add a detail entry
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Ok,
    Error,
}

/// Human-readable summary per category
#[derive(Debug, Clone, Serialize)]
pub struct Verbose {
    #[serde(rename = "Database")]
    pub database: String,
    #[serde(rename = "Models")]
    pub models: String,
    #[serde(rename = "Environment")]
    pub environment: String,
    #[serde(rename = "Core modules")]
    pub core_modules: String,
    #[serde(rename = "Plugins found")]
    pub plugins_found: String,
    #[serde(rename = "Plugins import")]
    pub plugins_import: String,
    #[serde(rename = "Essential files")]
    pub essential_files: String,
    #[serde(rename = "Endpoints")]
    pub endpoints: String,
    #[serde(rename = "Runtime version")]
    pub runtime_version: String,
    #[serde(rename = "Core packages")]
    pub core_packages: String,
}

/// Structured detail per category
#[derive(Debug, Clone, Serialize)]
pub struct Checks {
    pub database: ProbeResult,
    pub models: ProbeResult,
    pub env_vars: ProbeResult,
    pub imports: ProbeResult,
    pub plugins_found: Vec<String>,
    pub plugins_import: ProbeResult,
    pub essential_files: BTreeMap<String, bool>,
    pub endpoints: Vec<RouteRecord>,
    pub runtime_version: String,
    pub core_packages: BTreeMap<String, String>,
}

/// Full health report returned by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall_status: OverallStatus,
    pub checked_at: DateTime<Utc>,
    pub verbose: Verbose,
    pub checks: Checks,
}

impl HealthReport {
    /// Whether the overall status is `ok`
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.overall_status == OverallStatus::Ok
    }
}

/// Everything the health probes read
#[derive(Clone)]
pub struct HealthContext {
    pub plugins_dir: PathBuf,
    pub entry_file: String,
    pub base_dir: PathBuf,
    pub lockfile: PathBuf,
    pub probe_timeout: Duration,
    pub checks: HealthConfig,
    pub db: Option<DbPool>,
    pub models: Arc<ModelRegistry>,
    pub modules: Arc<ModuleCatalog>,
    pub registry: Arc<PluginRegistry>,
    pub env: Arc<dyn EnvSource>,
    pub routes: RouteTable,
}

impl HealthContext {
    /// Build from host services and the host's live route table
    #[must_use]
    pub fn new(services: &HostServices, routes: RouteTable) -> Self {
        let config = &services.config;
        Self {
            plugins_dir: config.plugins_dir.clone(),
            entry_file: config.entry_file.clone(),
            base_dir: config.base_dir.clone(),
            lockfile: config.lockfile_path(),
            probe_timeout: config.probe_timeout,
            checks: config.health.clone(),
            db: services.db.clone(),
            models: services.models.clone(),
            modules: services.modules.clone(),
            registry: services.registry.clone(),
            env: services.env.clone(),
            routes,
        }
    }
}

/// Run a blocking probe with a time limit, turning panics and timeouts into
/// the probe's failure value
async fn bounded<T, F, E>(limit: Duration, probe: &'static str, work: F, on_failure: E) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    E: FnOnce(String) -> T,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::error!(probe, error = %e, "health probe failed");
            on_failure(format!("Probe '{probe}' failed: {e}"))
        }
        Err(_) => {
            tracing::warn!(probe, timeout = ?limit, "health probe timed out");
            on_failure(format!(
                "Probe '{probe}' timed out after {}ms",
                limit.as_millis()
            ))
        }
    }
}

/// Run every probe and assemble the report
pub async fn run(ctx: &HealthContext) -> HealthReport {
    let limit = ctx.probe_timeout;

    let env_probe = {
        let env = ctx.env.clone();
        let required = ctx.checks.required_env.clone();
        move || probes::check_env_vars(env.as_ref(), &required)
    };
    let imports_probe = {
        let modules = ctx.modules.clone();
        let names = ctx.checks.core_modules.clone();
        move || probes::check_imports(&modules, &names)
    };
    let database_probe = {
        let db = ctx.db.clone();
        move || probes::check_database(db.as_ref())
    };
    let models_probe = {
        let db = ctx.db.clone();
        let models = ctx.models.clone();
        move || probes::check_models(db.as_ref(), &models)
    };
    let plugins_probe = {
        let dir = ctx.plugins_dir.clone();
        let entry_file = ctx.entry_file.clone();
        let registry = ctx.registry.clone();
        move || probes::check_plugins_importable(&dir, &entry_file, &registry)
    };
    let files_probe = {
        let base_dir = ctx.base_dir.clone();
        let files = ctx.checks.essential_files.clone();
        move || probes::check_files(&base_dir, &files)
    };
    let packages_probe = {
        let lockfile = ctx.lockfile.clone();
        let packages = ctx.checks.core_packages.clone();
        move || probes::check_packages(&lockfile, &packages)
    };

    let essential_files = &ctx.checks.essential_files;
    let core_packages = &ctx.checks.core_packages;

    let (env_vars, imports, database, models, plugins, files, packages) = tokio::join!(
        bounded(limit, "environment", env_probe, ProbeResult::error),
        bounded(limit, "imports", imports_probe, ProbeResult::error),
        bounded(limit, "database", database_probe, ProbeResult::error),
        bounded(limit, "models", models_probe, ProbeResult::error),
        bounded(limit, "plugins", plugins_probe, |reason| PluginsCheck {
            found: Vec::new(),
            result: ProbeResult::error(reason),
        }),
        bounded(limit, "files", files_probe, |reason| FilesCheck {
            present: essential_files.iter().map(|f| (f.clone(), false)).collect(),
            summary: reason,
        }),
        bounded(limit, "packages", packages_probe, |reason| PackagesCheck {
            versions: core_packages
                .iter()
                .map(|p| (p.clone(), format!("missing ({reason})")))
                .collect(),
            summary: reason,
        }),
    );

    let endpoints = ctx.routes.snapshot();
    let runtime_version = probes::runtime_version();

    let overall_ok = [&env_vars, &imports, &database, &models, &plugins.result]
        .iter()
        .all(|probe| probe.status.passes())
        && files.all_present();
    let overall_status = if overall_ok {
        OverallStatus::Ok
    } else {
        OverallStatus::Error
    };

    tracing::debug!(
        status = ?overall_status,
        plugins = plugins.found.len(),
        endpoints = endpoints.len(),
        "health check completed"
    );

    let verbose = Verbose {
        database: database.summary.clone(),
        models: models.summary.clone(),
        environment: env_vars.summary.clone(),
        core_modules: imports.summary.clone(),
        plugins_found: if plugins.found.is_empty() {
            "None".to_string()
        } else {
            plugins.found.join(", ")
        },
        plugins_import: plugins.result.summary.clone(),
        essential_files: files.summary,
        endpoints: format!("{} endpoints registered.", endpoints.len()),
        runtime_version: runtime_version.clone(),
        core_packages: packages.summary,
    };

    HealthReport {
        overall_status,
        checked_at: Utc::now(),
        verbose,
        checks: Checks {
            database,
            models,
            env_vars,
            imports,
            plugins_found: plugins.found,
            plugins_import: plugins.result,
            essential_files: files.present,
            endpoints,
            runtime_version,
            core_packages: packages.versions,
        },
    }
}
