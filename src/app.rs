//! Application assembly: database, plugin discovery and loading, HTTP server

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, DatabaseTarget};
use crate::db::{self, DbPool, ModelRegistry};
use crate::health::{self, EnvSource, HealthContext, HealthReport, ProcessEnv};
use crate::host::{HostServices, RouteHost, RouteRecord};
use crate::modules::ModuleCatalog;
use crate::plugins::{self, LoadResult, PluginDescriptor, PluginRegistry};
use crate::{Error, Result};

/// A fully loaded host, ready to serve
pub struct App {
    config: Arc<Config>,
    host: RouteHost,
    plugins: Vec<PluginDescriptor>,
    load_results: Vec<LoadResult>,
}

/// Builder for [`App`]
pub struct AppBuilder {
    config: Config,
    registry: Option<PluginRegistry>,
    env: Option<Arc<dyn EnvSource>>,
    db: Option<DbPool>,
    models: Option<ModelRegistry>,
}

impl AppBuilder {
    /// Create a builder for `config`
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: None,
            env: None,
            db: None,
            models: None,
        }
    }

    /// Use this plugin registry instead of the built-in one
    #[must_use]
    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Read environment variables from `env` instead of the process
    #[must_use]
    pub fn env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Some(Arc::new(env));
        self
    }

    /// Use an already open database instead of the configured URL
    #[must_use]
    pub fn database(mut self, pool: DbPool) -> Self {
        self.db = Some(pool);
        self
    }

    /// Use this model registry instead of the core models
    #[must_use]
    pub fn models(mut self, models: ModelRegistry) -> Self {
        self.models = Some(models);
        self
    }

    /// Open the database, discover plugins and load them
    ///
    /// Individual plugin failures are recorded, not returned.
    ///
    /// # Errors
    ///
    /// Returns error if the database URL is unsupported or cannot be opened,
    /// or if the plugins root is missing
    pub fn build(self) -> Result<App> {
        let config = Arc::new(self.config);

        let db = match self.db {
            Some(pool) => Some(pool),
            None => open_database(&config)?,
        };

        let registry = Arc::new(self.registry.unwrap_or_else(PluginRegistry::builtin));
        let models = Arc::new(self.models.unwrap_or_else(ModelRegistry::core));
        let modules = Arc::new(ModuleCatalog::core(registry.clone(), models.clone()));
        let env = self.env.unwrap_or_else(|| Arc::new(ProcessEnv));

        let mut descriptors = plugins::discover(&config.plugins_dir, &config.entry_file)?;
        tracing::info!(
            root = %config.plugins_dir.display(),
            count = descriptors.len(),
            "discovered plugins"
        );

        let mut host = RouteHost::new(HostServices {
            config: config.clone(),
            db,
            registry: registry.clone(),
            models,
            modules,
            env,
        });
        let load_results = plugins::load(&mut host, &registry, &mut descriptors);

        let failed = load_results.iter().filter(|r| !r.is_loaded()).count();
        tracing::info!(
            loaded = load_results.len() - failed,
            failed,
            routes = host.route_table().len(),
            "plugins loaded"
        );

        Ok(App {
            config,
            host,
            plugins: descriptors,
            load_results,
        })
    }
}

impl App {
    /// Start building an app from `config`
    #[must_use]
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Build an app with the built-in plugins, the process environment and the
    /// configured database
    ///
    /// # Errors
    ///
    /// See [`AppBuilder::build`]
    pub fn bootstrap(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Resolved configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discovered plugins with their load state
    #[must_use]
    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    /// Per-plugin load outcomes, in load order
    #[must_use]
    pub fn load_results(&self) -> &[LoadResult] {
        &self.load_results
    }

    /// Every mounted route
    #[must_use]
    pub fn routes(&self) -> Vec<RouteRecord> {
        self.host.routes()
    }

    /// Run the health probes directly, without going through HTTP
    pub async fn health_report(&self) -> HealthReport {
        let ctx = HealthContext::new(self.host.services(), self.host.route_table());
        health::run(&ctx).await
    }

    /// Router with every plugin route plus CORS and request tracing
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        self.host
            .router()
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound or the server fails
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, routes = self.host.route_table().len(), "keel listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("server error: {e}")))?;

        Ok(())
    }
}

fn open_database(config: &Config) -> Result<Option<DbPool>> {
    match config.database()? {
        None => {
            tracing::info!("no database configured");
            Ok(None)
        }
        Some(DatabaseTarget::Memory) => db::init_memory().map(Some),
        Some(DatabaseTarget::File(path)) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            db::init(&path).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_for(plugins_dir: &std::path::Path) -> Config {
        Config {
            plugins_dir: plugins_dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn missing_plugins_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = App::builder(config_for(&dir.path().join("absent")))
            .env(HashMap::<String, String>::new())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unsupported_database_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: Some("postgresql://localhost/keel".to_string()),
            ..config_for(dir.path())
        };
        assert!(matches!(
            App::builder(config).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("keel.db");
        let config = Config {
            database_url: Some(format!("sqlite://{}", db_path.display())),
            ..config_for(dir.path())
        };

        let app = App::builder(config).build().unwrap();
        assert!(db_path.exists());
        assert!(app.plugins().is_empty());
        assert!(app.routes().is_empty());
    }

    #[test]
    fn builtin_plugins_load() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["health", "simple-security"] {
            let plugin = dir.path().join(name);
            std::fs::create_dir(&plugin).unwrap();
            std::fs::write(plugin.join("plugin.toml"), "").unwrap();
        }

        let app = App::builder(config_for(dir.path())).build().unwrap();

        assert!(app.load_results().iter().all(LoadResult::is_loaded));
        let paths: Vec<String> = app.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/", "/sanitization/text"]);
    }
}
