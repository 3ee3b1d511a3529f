//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use keel_host::{App, Config, DbPool, PluginRegistry, db};
use tempfile::TempDir;
use tower::ServiceExt;

/// Temporary project tree with a plugins root and essential files
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// Project with `Cargo.toml`, `src/lib.rs`, `src/main.rs` and an empty
    /// plugins root
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("plugins")).unwrap();
        for file in ["Cargo.toml", "src/lib.rs", "src/main.rs"] {
            std::fs::write(dir.path().join(file), "").unwrap();
        }
        std::fs::write(
            dir.path().join("Cargo.lock"),
            "version = 4\n\n[[package]]\nname = \"axum\"\nversion = \"0.8.4\"\n\n\
             [[package]]\nname = \"tokio\"\nversion = \"1.47.1\"\n",
        )
        .unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root().join("plugins")
    }

    /// Create a plugin directory with an entry file
    pub fn add_plugin(&self, name: &str) -> PathBuf {
        let dir = self.plugins_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.toml"),
            format!("description = \"{name} test plugin\"\nversion = \"0.1.0\"\n"),
        )
        .unwrap();
        dir
    }

    /// Create a directory with no entry file
    pub fn add_decoy(&self, name: &str) {
        let dir = self.plugins_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("README.md"), "not a plugin").unwrap();
    }

    pub fn config(&self) -> Config {
        Config {
            plugins_dir: self.plugins_dir(),
            base_dir: self.root().to_path_buf(),
            ..Config::default()
        }
    }

    /// Build an app with the given registry and a database-bearing env map
    pub fn app(&self, registry: PluginRegistry, db: Option<DbPool>) -> App {
        let env = HashMap::from([(
            "DATABASE_URL".to_string(),
            "sqlite://:memory:".to_string(),
        )]);
        let mut builder = App::builder(self.config()).registry(registry).env(env);
        if let Some(pool) = db {
            builder = builder.database(pool);
        }
        builder.build().expect("failed to build app")
    }
}

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Send a request through the app's router
pub async fn send(app: &App, request: Request<Body>) -> Response<Body> {
    app.router().oneshot(request).await.unwrap()
}

/// GET `uri`, returning the status and JSON body
pub async fn get_json(app: &App, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await;
    into_json(response).await
}

/// Read a response body as JSON
pub async fn into_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
