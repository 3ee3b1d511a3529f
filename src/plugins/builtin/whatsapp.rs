//! `WhatsApp` messaging plugin (`GET /whatsapp/send`)
//!
//! Credentials live in `credentials.yaml` inside the plugin directory and are
//! read on every request, so a missing or broken file surfaces as an error
//! response instead of a load failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use reqwest::Client;
use serde::Deserialize;

use crate::host::PluginRouter;
use crate::plugins::{Plugin, PluginApp};
use crate::{Error, Result};

/// Credentials file name inside the plugin directory
pub const CREDENTIALS_FILE: &str = "credentials.yaml";

/// Graph API version used for outgoing messages
const API_VERSION: &str = "v17.0";

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Contents of `credentials.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// API base URL (e.g. `https://graph.facebook.com`)
    pub api_url: String,
    /// Bearer token
    pub token: String,
    /// Sender phone number ID
    pub phone_number_id: String,
}

/// Load credentials from a plugin directory
///
/// # Errors
///
/// Returns error if the file is missing or malformed
pub fn load_credentials(plugin_dir: &Path) -> Result<Credentials> {
    let path = plugin_dir.join(CREDENTIALS_FILE);
    if !path.exists() {
        return Err(Error::Config(format!(
            "{CREDENTIALS_FILE} not found in WhatsApp plugin directory"
        )));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Build the Cloud API message payload
#[must_use]
pub fn message_body(to: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": message }
    })
}

/// Mounts the send endpoint under `/whatsapp`
#[derive(Default)]
pub struct WhatsAppPlugin {
    client: Client,
}

#[derive(Clone)]
struct SendState {
    plugin_dir: Arc<PathBuf>,
    client: Client,
}

/// Query parameters for `/whatsapp/send`
#[derive(Debug, Deserialize)]
pub struct SendParams {
    pub to: String,
    pub message: String,
}

impl Plugin for WhatsAppPlugin {
    fn init_plugin(&self, app: &mut PluginApp<'_>) -> Result<()> {
        let state = SendState {
            plugin_dir: Arc::new(app.plugin_dir().to_path_buf()),
            client: self.client.clone(),
        };
        if !state.plugin_dir.join(CREDENTIALS_FILE).exists() {
            tracing::warn!(
                path = %state.plugin_dir.display(),
                "{CREDENTIALS_FILE} missing, /whatsapp/send will return errors until it is added"
            );
        }
        let router = PluginRouter::new()
            .get("/send", "send_message", send_message)
            .with_state(state);
        app.mount("/whatsapp", router)
    }

    fn description(&self) -> &str {
        "WhatsApp Cloud API messaging"
    }
}

async fn send_message(
    State(state): State<SendState>,
    Query(params): Query<SendParams>,
) -> Json<serde_json::Value> {
    match forward(&state, &params).await {
        Ok(body) => Json(body),
        Err(e) => {
            tracing::warn!(to = %params.to, error = %e, "whatsapp send failed");
            Json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

async fn forward(state: &SendState, params: &SendParams) -> Result<serde_json::Value> {
    let creds = load_credentials(&state.plugin_dir)?;
    let url = format!(
        "{}/{API_VERSION}/{}/messages",
        creds.api_url.trim_end_matches('/'),
        creds.phone_number_id
    );

    let response = state
        .client
        .post(&url)
        .bearer_auth(&creds.token)
        .json(&message_body(&params.to, &params.message))
        .timeout(SEND_TIMEOUT)
        .send()
        .await?;

    let status = response.status().as_u16();
    let body: serde_json::Value = response.json().await?;
    tracing::debug!(to = %params.to, status, "whatsapp message forwarded");

    Ok(serde_json::json!({
        "status": status,
        "response": body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_credentials(dir.path()).unwrap_err();
        assert!(err.to_string().contains("credentials.yaml not found"));
    }

    #[test]
    fn parse_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CREDENTIALS_FILE),
            "api_url: https://graph.facebook.com\ntoken: secret\nphone_number_id: \"12345\"\n",
        )
        .unwrap();

        let creds = load_credentials(dir.path()).unwrap();
        assert_eq!(creds.api_url, "https://graph.facebook.com");
        assert_eq!(creds.token, "secret");
        assert_eq!(creds.phone_number_id, "12345");
    }

    #[test]
    fn malformed_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDENTIALS_FILE), "token: only").unwrap();
        assert!(matches!(
            load_credentials(dir.path()),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn body_shape() {
        let body = message_body("+15550001", "hi");
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["to"], "+15550001");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "hi");
    }
}
