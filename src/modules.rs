//! Catalog of core modules and their self-checks
//!
//! The import probe resolves module identifiers against this catalog. Each
//! entry runs a cheap self-check that exercises the module for real (applies
//! the schema to a scratch database, validates table names, ...).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{self, ModelRegistry};
use crate::plugins::PluginRegistry;
use crate::plugins::builtin::sanitization::sanitize_text;
use crate::{Error, Result};

type ModuleCheck = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Named core modules with self-checks
#[derive(Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, ModuleCheck>,
}

impl ModuleCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the host's own modules
    #[must_use]
    pub fn core(registry: Arc<PluginRegistry>, models: Arc<ModelRegistry>) -> Self {
        let mut catalog = Self::new();
        catalog.register("db.schema", db::self_check);
        catalog.register("db.models", move || models.validate());
        catalog.register("plugins.registry", move || {
            if registry.is_empty() {
                Err(Error::Probe("no plugins compiled into the registry".to_string()))
            } else {
                Ok(())
            }
        });
        catalog.register("plugins.sanitization", || {
            if sanitize_text("<b>ok</b>") == "ok" {
                Ok(())
            } else {
                Err(Error::Probe("sanitizer returned unexpected output".to_string()))
            }
        });
        catalog
    }

    /// Register a module, replacing any previous entry with the same name
    pub fn register<F>(&mut self, name: &str, check: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.modules.insert(name.to_string(), Box::new(check));
    }

    /// Resolve a module and run its self-check
    ///
    /// # Errors
    ///
    /// Returns error if the module is unknown or its self-check fails
    pub fn resolve(&self, name: &str) -> Result<()> {
        let check = self
            .modules
            .get(name)
            .ok_or_else(|| Error::Probe(format!("module '{name}' not found")))?;
        check()
    }

    /// Registered module names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}
