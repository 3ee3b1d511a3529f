//! Shared routable host that plugins mount their routes onto
//!
//! axum's `Router` cannot enumerate its routes, so every registration goes
//! through [`RouteHost`], which keeps a parallel [`RouteTable`] of
//! `(path, name, methods)` records. The table is shared behind an `Arc`, so a
//! handle taken early (by the health plugin) still sees routes mounted later.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use axum::Router;
use axum::handler::Handler;
use axum::http::Method;
use axum::routing::MethodRouter;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::db::{DbPool, ModelRegistry};
use crate::health::EnvSource;
use crate::modules::ModuleCatalog;
use crate::plugins::PluginRegistry;
use crate::{Error, Result};

/// A single registered route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    pub path: String,
    pub name: String,
    pub methods: BTreeSet<String>,
}

/// Shared handle on the host's route table
#[derive(Debug, Clone, Default)]
pub struct RouteTable(Arc<RwLock<Vec<RouteRecord>>>);

impl RouteTable {
    /// Copy of every route currently registered, in registration order
    #[must_use]
    pub fn snapshot(&self) -> Vec<RouteRecord> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, path: &str, method: &str) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.path == path && r.methods.contains(method))
    }

    fn same_shape(&self, path: &str) -> Option<String> {
        let shape = path_shape(path);
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.path != path && path_shape(&r.path) == shape)
            .map(|r| r.path.clone())
    }

    fn extend(&self, records: Vec<RouteRecord>) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    fn replace(&self, records: Vec<RouteRecord>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = records;
    }
}

/// Services the host hands to every plugin
#[derive(Clone)]
pub struct HostServices {
    pub config: Arc<Config>,
    pub db: Option<DbPool>,
    pub registry: Arc<PluginRegistry>,
    pub models: Arc<ModelRegistry>,
    pub modules: Arc<ModuleCatalog>,
    pub env: Arc<dyn EnvSource>,
}

/// A set of routes a plugin builds before mounting them on the host
///
/// Routes are kept unbuilt until [`RouteHost::mount`] so the host can reject
/// conflicts before touching the live router.
pub struct PluginRouter<S = ()> {
    routes: Vec<PendingRoute<S>>,
}

struct PendingRoute<S> {
    path: String,
    name: String,
    methods: BTreeSet<String>,
    method_router: MethodRouter<S>,
}

impl<S> Default for PluginRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PluginRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create an empty router
    #[must_use]
    pub const fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `path` under the given methods
    #[must_use]
    pub fn route(
        mut self,
        path: &str,
        name: &str,
        methods: &[Method],
        method_router: MethodRouter<S>,
    ) -> Self {
        self.routes.push(PendingRoute {
            path: path.to_string(),
            name: name.to_string(),
            methods: methods.iter().map(ToString::to_string).collect(),
            method_router,
        });
        self
    }

    /// Register a GET handler
    #[must_use]
    pub fn get<H, T>(self, path: &str, name: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, name, &[Method::GET], axum::routing::get(handler))
    }

    /// Register a POST handler
    #[must_use]
    pub fn post<H, T>(self, path: &str, name: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.route(path, name, &[Method::POST], axum::routing::post(handler))
    }

    /// Provide the state for every handler, producing a mountable router
    #[must_use]
    pub fn with_state<S2>(self, state: S) -> PluginRouter<S2>
    where
        S2: Clone + Send + Sync + 'static,
    {
        PluginRouter {
            routes: self
                .routes
                .into_iter()
                .map(|r| PendingRoute {
                    path: r.path,
                    name: r.name,
                    methods: r.methods,
                    method_router: r.method_router.with_state(state.clone()),
                })
                .collect(),
        }
    }

    /// Number of routes in this router
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the router holds no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Saved host state used to undo a failed plugin's registrations
pub struct Checkpoint {
    router: Router,
    routes: Vec<RouteRecord>,
}

/// The shared routable host
pub struct RouteHost {
    router: Router,
    routes: RouteTable,
    services: HostServices,
}

impl RouteHost {
    /// Create an empty host
    #[must_use]
    pub fn new(services: HostServices) -> Self {
        Self {
            router: Router::new(),
            routes: RouteTable::default(),
            services,
        }
    }

    /// Services shared with plugins
    #[must_use]
    pub const fn services(&self) -> &HostServices {
        &self.services
    }

    /// Handle on the live route table
    #[must_use]
    pub fn route_table(&self) -> RouteTable {
        self.routes.clone()
    }

    /// Every registered route
    #[must_use]
    pub fn routes(&self) -> Vec<RouteRecord> {
        self.routes.snapshot()
    }

    /// Register one handler directly on the host
    ///
    /// # Errors
    ///
    /// Returns error if the path is invalid or any method is already taken
    pub fn route(
        &mut self,
        path: &str,
        name: &str,
        methods: &[Method],
        method_router: MethodRouter,
    ) -> Result<()> {
        self.mount("", PluginRouter::new().route(path, name, methods, method_router))
    }

    /// Mount a plugin router under `prefix` (`""` or `"/"` mounts at the root)
    ///
    /// Either every route is mounted or none is. Captures use axum's
    /// `{name}` / `{*rest}` syntax; anything axum would refuse is returned as
    /// [`Error::InvalidRoute`] instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns error if a path is invalid, a `(path, method)` pair is
    /// already registered, or a capture clashes with an existing route
    pub fn mount(&mut self, prefix: &str, router: PluginRouter) -> Result<()> {
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return Err(Error::InvalidRoute(format!(
                "prefix '{prefix}' must start with '/'"
            )));
        }

        let mut staged: Vec<(String, &PendingRoute<()>)> = Vec::with_capacity(router.len());
        for pending in &router.routes {
            if !pending.path.starts_with('/') {
                return Err(Error::InvalidRoute(format!(
                    "path '{}' must start with '/'",
                    pending.path
                )));
            }
            let full = join_path(prefix, &pending.path);
            validate_segments(&full)?;
            let clash = staged
                .iter()
                .find(|(p, _)| *p != full && path_shape(p) == path_shape(&full))
                .map(|(p, _)| p.clone())
                .or_else(|| self.routes.same_shape(&full));
            if let Some(existing) = clash {
                return Err(Error::InvalidRoute(format!(
                    "'{full}' captures the same segments as '{existing}'"
                )));
            }
            for method in &pending.methods {
                let taken_here = staged
                    .iter()
                    .any(|(p, r)| *p == full && r.methods.contains(method));
                if taken_here || self.routes.contains(&full, method) {
                    return Err(Error::RouteConflict {
                        method: method.clone(),
                        path: full,
                    });
                }
            }
            staged.push((full, pending));
        }

        let records: Vec<RouteRecord> = staged
            .iter()
            .map(|(full, pending)| RouteRecord {
                path: full.clone(),
                name: pending.name.clone(),
                methods: pending.methods.clone(),
            })
            .collect();

        let current = self.router.clone();
        let built = catch_unwind(AssertUnwindSafe(|| {
            let mut next = current;
            for (record, pending) in records.iter().zip(router.routes) {
                next = next.route(&record.path, pending.method_router);
            }
            next
        }));
        self.router = built.map_err(|payload| {
            Error::InvalidRoute(format!(
                "router rejected routes: {}",
                panic_message(payload.as_ref())
            ))
        })?;

        for record in &records {
            tracing::debug!(path = %record.path, name = %record.name, methods = ?record.methods, "route mounted");
        }
        self.routes.extend(records);
        Ok(())
    }

    /// Save the current router and route table
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            router: self.router.clone(),
            routes: self.routes.snapshot(),
        }
    }

    /// Roll back to a saved state
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.router = checkpoint.router;
        self.routes.replace(checkpoint.routes);
    }

    /// The axum router holding every mounted route
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

static CAPTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\*?[A-Za-z_][A-Za-z0-9_]*\}$").expect("valid regex"));

/// Reject segments axum's router would panic on
fn validate_segments(path: &str) -> Result<()> {
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(Error::InvalidRoute(format!(
                "'{path}': use '{{name}}' captures, not '{segment}'"
            )));
        }
        if segment.contains(['{', '}']) {
            if !CAPTURE.is_match(segment) {
                return Err(Error::InvalidRoute(format!(
                    "'{path}': malformed capture '{segment}'"
                )));
            }
            if segment.starts_with("{*") && i + 1 != segments.len() {
                return Err(Error::InvalidRoute(format!(
                    "'{path}': wildcard '{segment}' must be the last segment"
                )));
            }
        }
    }
    Ok(())
}

/// Path with capture names erased; two distinct paths with the same shape
/// collide in the router
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") {
                "{*}"
            } else if segment.starts_with('{') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Message carried by a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Join a mount prefix and a route path
fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path == "/" {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}{path}")
    }
}
