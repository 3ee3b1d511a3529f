//! Build-time plugin registry

use std::collections::BTreeMap;
use std::sync::Arc;

use super::builtin::{HealthPlugin, SanitizationPlugin, WhatsAppPlugin};
use super::loader::PluginApp;
use crate::{Error, Result};

/// A plugin's code
///
/// `init_plugin` receives the plugin-scoped view of the shared host and may
/// register any number of routes on it.
pub trait Plugin: Send + Sync {
    /// Mount the plugin's routes and state onto the host
    ///
    /// # Errors
    ///
    /// Returns error if the plugin cannot initialize; the loader records the
    /// failure and rolls back anything the plugin mounted
    fn init_plugin(&self, app: &mut PluginApp<'_>) -> Result<()>;

    /// Short human-readable description
    fn description(&self) -> &str {
        ""
    }
}

/// Adapter so plain functions and closures can be registered as plugins
struct FnPlugin<F>(F);

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut PluginApp<'_>) -> Result<()> + Send + Sync,
{
    fn init_plugin(&self, app: &mut PluginApp<'_>) -> Result<()> {
        (self.0)(app)
    }
}

/// Mapping from plugin name to plugin code
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every plugin compiled into this binary
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert("health", HealthPlugin);
        registry.insert("simple-security", SanitizationPlugin);
        registry.insert("whatsapp-api", WhatsAppPlugin::default());
        registry
    }

    fn insert(&mut self, name: &str, plugin: impl Plugin + 'static) {
        self.plugins.insert(name.to_string(), Arc::new(plugin));
    }

    /// Register a plugin under `name`
    ///
    /// # Errors
    ///
    /// Returns error if a plugin is already registered under that name
    pub fn register(&mut self, name: &str, plugin: impl Plugin + 'static) -> Result<()> {
        if self.plugins.contains_key(name) {
            return Err(Error::Config(format!(
                "plugin '{name}' is already registered"
            )));
        }
        tracing::debug!(plugin = %name, "registered plugin");
        self.insert(name, plugin);
        Ok(())
    }

    /// Register a function as a plugin
    ///
    /// # Errors
    ///
    /// Returns error if a plugin is already registered under that name
    pub fn register_fn<F>(&mut self, name: &str, init: F) -> Result<()>
    where
        F: Fn(&mut PluginApp<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, FnPlugin(init))
    }

    /// Look up a plugin by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Whether a plugin is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered plugin names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Number of registered plugins
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugins are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
