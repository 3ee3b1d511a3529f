//! Plugin system for the Keel host
//!
//! A plugin is a subdirectory of the plugins root holding a well-known entry
//! file (`plugin.toml` by default). Discovery only looks at the filesystem;
//! the code behind each plugin comes from the [`PluginRegistry`], an explicit
//! name-to-plugin table compiled into the binary.

pub mod builtin;
pub mod discovery;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use discovery::{PluginDescriptor, discover};
pub use loader::{LoadResult, LoadStatus, PluginApp, load};
pub use manifest::PluginManifest;
pub use registry::{Plugin, PluginRegistry};

/// Default entry-point file name
pub const DEFAULT_ENTRY_FILE: &str = "plugin.toml";
