//! HTTP integration tests against a fully loaded host

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use keel_host::{Error, LoadStatus, PluginRegistry, PluginRouter};

mod common;
use common::{Fixture, get_json, into_json, send, setup_test_db};

/// Fixture with every built-in plugin plus a decoy directory
fn builtin_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.add_plugin("health");
    fixture.add_plugin("simple-security");
    fixture.add_plugin("whatsapp-api");
    fixture.add_decoy("decoy");
    fixture
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let (status, json) = get_json(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["overall_status"], "ok");
    assert!(json["checked_at"].is_string());
    assert_eq!(json["checks"]["database"]["status"], "no-db");
    assert_eq!(json["checks"]["env_vars"]["status"], "ok");
    assert_eq!(json["checks"]["imports"]["status"], "ok");
    assert_eq!(json["checks"]["plugins_import"]["status"], "ok");
    assert_eq!(json["checks"]["core_packages"]["axum"], "0.8.4");
    assert_eq!(
        json["verbose"]["Plugins found"],
        "health, simple-security, whatsapp-api"
    );
    assert_eq!(json["verbose"]["Endpoints"], "3 endpoints registered.");
}

#[tokio::test]
async fn test_health_lists_every_endpoint() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let (_, json) = get_json(&app, "/").await;
    let endpoints = json["checks"]["endpoints"].as_array().unwrap();

    let find = |path: &str| {
        endpoints
            .iter()
            .find(|e| e["path"] == path)
            .unwrap_or_else(|| panic!("{path} not listed"))
    };
    assert_eq!(find("/")["methods"], serde_json::json!(["GET"]));
    assert_eq!(find("/sanitization/text")["methods"], serde_json::json!(["POST"]));
    assert_eq!(find("/whatsapp/send")["methods"], serde_json::json!(["GET"]));
    assert_eq!(find("/whatsapp/send")["name"], "send_message");
}

#[tokio::test]
async fn test_decoy_directory_is_not_a_plugin() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let names: Vec<&str> = app.plugins().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["health", "simple-security", "whatsapp-api"]);

    let (_, json) = get_json(&app, "/").await;
    assert_eq!(
        json["checks"]["plugins_found"],
        serde_json::json!(["health", "simple-security", "whatsapp-api"])
    );
}

#[tokio::test]
async fn test_plugin_metadata_is_recorded() {
    let fixture = builtin_fixture();
    std::fs::write(fixture.plugins_dir().join("health/plugin.toml"), "").unwrap();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let security = &app.plugins()[1];
    assert_eq!(security.name, "simple-security");
    assert_eq!(security.version.as_deref(), Some("0.1.0"));
    assert_eq!(security.description.as_deref(), Some("simple-security test plugin"));
    assert!(security.summary().contains("0.1.0"));

    // Empty entry file: description comes from the compiled-in plugin
    let health = &app.plugins()[0];
    assert!(health.version.is_none());
    assert!(health.description.as_deref().unwrap().starts_with("Composite health report"));
}

#[tokio::test]
async fn test_missing_essential_file_flips_overall_status() {
    let fixture = builtin_fixture();
    std::fs::remove_file(fixture.root().join("src/main.rs")).unwrap();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let (status, json) = get_json(&app, "/").await;

    // Still 200; the verdict lives in the body
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["overall_status"], "error");
    assert_eq!(json["checks"]["essential_files"]["src/main.rs"], false);
    assert_eq!(json["checks"]["essential_files"]["Cargo.toml"], true);
}

#[tokio::test]
async fn test_health_with_database() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), Some(setup_test_db()));

    let (_, json) = get_json(&app, "/").await;

    assert_eq!(json["overall_status"], "ok");
    assert_eq!(json["checks"]["database"]["status"], "ok");
    assert_eq!(json["checks"]["models"]["status"], "ok");
}

#[tokio::test]
async fn test_sanitization_endpoint() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let request = Request::builder()
        .method("POST")
        .uri("/sanitization/text")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"text": "<script>alert(1)</script>hello; DROP TABLE users --"}"#,
        ))
        .unwrap();
    let (status, json) = into_json(send(&app, request).await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sanitized"], "alert(1)hello DROP TABLE users ");
}

#[tokio::test]
async fn test_sanitization_rejects_get() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let response = send(
        &app,
        Request::builder()
            .uri("/sanitization/text")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_whatsapp_without_credentials_reports_error() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let (status, json) = get_json(&app, "/whatsapp/send?to=15550001111&message=hi").await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("credentials.yaml not found")
    );
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let response = send(
        &app,
        Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failing_plugin_is_isolated() {
    async fn hello() -> &'static str {
        "hello"
    }

    let fixture = builtin_fixture();
    fixture.add_plugin("a-broken");
    fixture.add_plugin("greeter");

    let mut registry = PluginRegistry::builtin();
    registry
        .register_fn("a-broken", |app| {
            app.mount("/broken", PluginRouter::new().get("/", "broken", hello))?;
            Err(Error::Config("missing credentials".to_string()))
        })
        .unwrap();
    registry
        .register_fn("greeter", |app| {
            app.mount("/greeter", PluginRouter::new().get("/", "greet", hello))
        })
        .unwrap();

    let app = fixture.app(registry, None);

    let broken = &app.load_results()[0];
    assert_eq!(broken.name, "a-broken");
    assert_eq!(broken.status, LoadStatus::Failed);
    assert!(broken.error.as_deref().unwrap().contains("missing credentials"));
    assert_eq!(
        app.load_results()
            .iter()
            .filter(|r| r.status == LoadStatus::Loaded)
            .count(),
        4
    );

    let response = send(
        &app,
        Request::builder().uri("/greeter").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Request::builder().uri("/broken").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (_, json) = get_json(&app, "/").await;
    let paths: Vec<&str> = json["checks"]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/greeter"));
    assert!(!paths.contains(&"/broken"));
}

#[tokio::test]
async fn test_health_report_without_http() {
    let fixture = builtin_fixture();
    let app = fixture.app(PluginRegistry::builtin(), None);

    let report = app.health_report().await;
    assert!(report.is_ok());
    assert_eq!(report.checks.endpoints.len(), 3);
}
