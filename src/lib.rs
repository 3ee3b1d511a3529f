//! Keel - plugin host with composite health reporting
//!
//! The host discovers plugins on disk, initializes each one against a shared
//! routable application, and serves every mounted route over HTTP. The
//! built-in health plugin aggregates probes into a single report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Plugins                         │
//! │   health  │  simple-security  │  whatsapp-api  │ ... │
//! └────────────────────┬────────────────────────────────┘
//!                      │ init_plugin
//! ┌────────────────────▼────────────────────────────────┐
//! │                     RouteHost                        │
//! │   Router  │  Route table  │  Host services          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Collaborators                      │
//! │   SQLite  │  Environment  │  Core modules  │  Files  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod host;
pub mod modules;
pub mod plugins;

pub use app::{App, AppBuilder};
pub use config::{Config, ConfigOverrides, HealthConfig};
pub use db::{DbConn, DbPool, ModelRegistry};
pub use error::{Error, Result};
pub use health::{EnvSource, HealthReport, OverallStatus, ProbeResult, ProbeStatus, ProcessEnv};
pub use host::{PluginRouter, RouteHost, RouteRecord, RouteTable};
pub use modules::ModuleCatalog;
pub use plugins::{LoadResult, LoadStatus, Plugin, PluginApp, PluginDescriptor, PluginRegistry};
