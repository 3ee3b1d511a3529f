//! Composite health check plugin, mounted at `/`

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::Result;
use crate::health::{self, HealthContext, HealthReport};
use crate::host::PluginRouter;
use crate::plugins::{Plugin, PluginApp};

/// Mounts the composite health report at the root path
pub struct HealthPlugin;

impl Plugin for HealthPlugin {
    fn init_plugin(&self, app: &mut PluginApp<'_>) -> Result<()> {
        let context = Arc::new(HealthContext::new(app.services(), app.route_table()));
        let router = PluginRouter::new()
            .get("/", "health_check", health_check)
            .with_state(context);
        app.merge(router)
    }

    fn description(&self) -> &str {
        "Composite health report covering environment, database, plugins and routes"
    }
}

/// Always answers 200; `overall_status` carries the verdict
async fn health_check(State(context): State<Arc<HealthContext>>) -> Json<HealthReport> {
    Json(health::run(&context).await)
}
