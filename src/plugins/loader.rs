//! Plugin loader
//!
//! Runs each discovered plugin's `init_plugin` against the shared host, one at
//! a time. A plugin that returns an error or panics is recorded as failed and
//! its partial registrations are rolled back; the remaining plugins still load.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use serde::Serialize;

use super::discovery::PluginDescriptor;
use super::manifest::PluginManifest;
use super::registry::PluginRegistry;
use crate::host::{HostServices, PluginRouter, RouteHost, RouteTable, panic_message};
use crate::{Error, Result};

/// Outcome of loading a single plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loaded,
    Failed,
}

/// Per-plugin load record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub name: String,
    pub status: LoadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadResult {
    /// Whether the plugin loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }
}

/// Plugin-scoped view of the shared host, passed to `init_plugin`
pub struct PluginApp<'a> {
    host: &'a mut RouteHost,
    descriptor: &'a PluginDescriptor,
}

impl<'a> PluginApp<'a> {
    /// Wrap the host for one plugin
    pub fn new(host: &'a mut RouteHost, descriptor: &'a PluginDescriptor) -> Self {
        Self { host, descriptor }
    }

    /// Name of the plugin being initialized
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The plugin's own directory
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.descriptor.dir
    }

    /// Host-provided services
    #[must_use]
    pub fn services(&self) -> &HostServices {
        self.host.services()
    }

    /// Live route table of the host
    #[must_use]
    pub fn route_table(&self) -> RouteTable {
        self.host.route_table()
    }

    /// Mount routes under `prefix`
    ///
    /// # Errors
    ///
    /// Returns error if any route conflicts with one already mounted
    pub fn mount(&mut self, prefix: &str, router: PluginRouter) -> Result<()> {
        self.host.mount(prefix, router)
    }

    /// Mount routes at the root
    ///
    /// # Errors
    ///
    /// Returns error if any route conflicts with one already mounted
    pub fn merge(&mut self, router: PluginRouter) -> Result<()> {
        self.host.mount("", router)
    }
}

/// Load every descriptor into `host`, in order
///
/// Descriptors are updated in place (`loaded` / `error`).
pub fn load(
    host: &mut RouteHost,
    registry: &PluginRegistry,
    descriptors: &mut [PluginDescriptor],
) -> Vec<LoadResult> {
    descriptors
        .iter_mut()
        .map(|descriptor| load_one(host, registry, descriptor))
        .collect()
}

fn load_one(
    host: &mut RouteHost,
    registry: &PluginRegistry,
    descriptor: &mut PluginDescriptor,
) -> LoadResult {
    describe(registry, descriptor);
    match init_one(host, registry, descriptor) {
        Ok(()) => {
            descriptor.loaded = true;
            descriptor.error = None;
            tracing::info!(plugin = %descriptor.name, "loaded plugin");
            LoadResult {
                name: descriptor.name.clone(),
                status: LoadStatus::Loaded,
                error: None,
            }
        }
        Err(e) => {
            let reason = match e {
                Error::PluginLoad { reason, .. } => reason,
                other => other.to_string(),
            };
            tracing::warn!(plugin = %descriptor.name, error = %reason, "plugin failed to load");
            descriptor.loaded = false;
            descriptor.error = Some(reason.clone());
            LoadResult {
                name: descriptor.name.clone(),
                status: LoadStatus::Failed,
                error: Some(reason),
            }
        }
    }
}

/// Fill in description and version from the entry file, falling back to the
/// registered plugin's own description
fn describe(registry: &PluginRegistry, descriptor: &mut PluginDescriptor) {
    let manifest = match PluginManifest::load(&descriptor.entry_point) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(plugin = %descriptor.name, error = %e, "unreadable entry file, no metadata");
            PluginManifest::default()
        }
    };

    descriptor.version = manifest.version;
    descriptor.description = manifest.description.or_else(|| {
        registry
            .get(&descriptor.name)
            .map(|plugin| plugin.description().to_string())
            .filter(|d| !d.is_empty())
    });
}

fn init_one(
    host: &mut RouteHost,
    registry: &PluginRegistry,
    descriptor: &PluginDescriptor,
) -> Result<()> {
    let plugin = registry.get(&descriptor.name).ok_or_else(|| Error::PluginLoad {
        name: descriptor.name.clone(),
        reason: "no plugin registered under this name".to_string(),
    })?;

    let checkpoint = host.checkpoint();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut app = PluginApp::new(host, descriptor);
        plugin.init_plugin(&mut app)
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(Error::PluginLoad {
            name: descriptor.name.clone(),
            reason: format!("init_plugin panicked: {}", panic_message(payload.as_ref())),
        }),
    };

    if result.is_err() {
        host.restore(checkpoint);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::test_services;

    async fn ok() -> &'static str {
        "ok"
    }

    fn descriptor(name: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            dir: format!("/plugins/{name}").into(),
            entry_point: format!("/plugins/{name}/plugin.toml").into(),
            loaded: false,
            error: None,
            description: None,
            version: None,
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register_fn("a-broken", |app| {
                app.mount("/a", PluginRouter::new().get("/partial", "partial", ok))?;
                Err(Error::Config("credentials.yaml not found".to_string()))
            })
            .unwrap();
        registry
            .register_fn("b-good", |app| {
                app.mount("/b", PluginRouter::new().get("/hello", "hello", ok))
            })
            .unwrap();
        registry
            .register_fn("c-panics", |_app| panic!("boom"))
            .unwrap();
        registry
    }

    #[test]
    fn failing_plugin_does_not_block_others() {
        let mut host = RouteHost::new(test_services());
        let mut descriptors = vec![descriptor("a-broken"), descriptor("b-good")];

        let results = load(&mut host, &registry(), &mut descriptors);

        assert_eq!(results[0].status, LoadStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("credentials.yaml"));
        assert_eq!(results[1].status, LoadStatus::Loaded);
        assert!(descriptors[1].loaded);
        assert!(!descriptors[0].loaded);
        assert!(descriptors[0].error.is_some());

        let paths: Vec<String> = host.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/b/hello"]);
    }

    #[test]
    fn panicking_plugin_is_isolated() {
        let mut host = RouteHost::new(test_services());
        let mut descriptors = vec![descriptor("b-good"), descriptor("c-panics")];

        let results = load(&mut host, &registry(), &mut descriptors);

        assert!(results[0].is_loaded());
        assert_eq!(results[1].status, LoadStatus::Failed);
        assert!(results[1].error.as_deref().unwrap().contains("boom"));
        assert_eq!(host.routes().len(), 1);
    }

    #[test]
    fn unregistered_plugin_fails() {
        let mut host = RouteHost::new(test_services());
        let mut descriptors = vec![descriptor("unknown")];

        let results = load(&mut host, &registry(), &mut descriptors);

        assert_eq!(results[0].status, LoadStatus::Failed);
        assert_eq!(
            results[0].error.as_deref(),
            Some("no plugin registered under this name")
        );
    }

    #[test]
    fn loading_twice_rejects_duplicate_routes() {
        let mut host = RouteHost::new(test_services());
        let registry = registry();

        let first = load(&mut host, &registry, &mut [descriptor("b-good")]);
        let second = load(&mut host, &registry, &mut [descriptor("b-good")]);

        assert!(first[0].is_loaded());
        assert_eq!(second[0].status, LoadStatus::Failed);
        assert_eq!(host.routes().len(), 1);
    }

    #[test]
    fn metadata_comes_from_entry_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("plugin.toml");
        std::fs::write(&entry, "description = \"Says hello\"\nversion = \"1.2.0\"\n").unwrap();
        let mut d = descriptor("b-good");
        d.entry_point = entry;

        let mut host = RouteHost::new(test_services());
        load(&mut host, &registry(), std::slice::from_mut(&mut d));

        assert_eq!(d.description.as_deref(), Some("Says hello"));
        assert_eq!(d.version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn description_falls_back_to_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register("health", crate::plugins::builtin::HealthPlugin)
            .unwrap();
        // Entry file does not exist, so nothing comes from disk
        let mut d = descriptor("health");

        let mut host = RouteHost::new(test_services());
        load(&mut host, &registry, std::slice::from_mut(&mut d));

        assert!(d.loaded);
        assert!(d.version.is_none());
        assert!(d.description.as_deref().unwrap().starts_with("Composite health report"));
    }

    #[test]
    fn plugin_app_exposes_descriptor() {
        let mut host = RouteHost::new(test_services());
        let d = descriptor("whatsapp-api");
        let app = PluginApp::new(&mut host, &d);
        assert_eq!(app.name(), "whatsapp-api");
        assert_eq!(app.plugin_dir(), Path::new("/plugins/whatsapp-api"));
    }
}
