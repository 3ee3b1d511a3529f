//! Input sanitization plugin (`POST /sanitization/text`)

use std::sync::LazyLock;

use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::host::PluginRouter;
use crate::plugins::{Plugin, PluginApp};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*?>").expect("valid regex"));

static SCRIPT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(javascript:|on\w+=)").expect("valid regex"));

static SQL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['";]|--"#).expect("valid regex"));

/// Strip HTML tags, script-like patterns and SQL metacharacters
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    let without_tags = HTML_TAG.replace_all(text, "");
    let without_scripts = SCRIPT_PATTERN.replace_all(&without_tags, "");
    SQL_CHARS.replace_all(&without_scripts, "").into_owned()
}

/// Request body for `/sanitization/text`
#[derive(Debug, Deserialize)]
pub struct SanitizeRequest {
    #[serde(default)]
    pub text: String,
}

/// Response body for `/sanitization/text`
#[derive(Debug, Serialize)]
pub struct SanitizeResponse {
    pub sanitized: String,
}

/// Mounts the sanitization endpoint under `/sanitization`
pub struct SanitizationPlugin;

impl Plugin for SanitizationPlugin {
    fn init_plugin(&self, app: &mut PluginApp<'_>) -> Result<()> {
        app.mount(
            "/sanitization",
            PluginRouter::new().post("/text", "sanitize_endpoint", sanitize_endpoint),
        )
    }

    fn description(&self) -> &str {
        "Input data sanitization"
    }
}

async fn sanitize_endpoint(Json(request): Json<SanitizeRequest>) -> Json<SanitizeResponse> {
    Json(SanitizeResponse {
        sanitized: sanitize_text(&request.text),
    })
}
