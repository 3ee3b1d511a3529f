//! Plugin entry file format (`plugin.toml`)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Optional metadata a plugin declares in its entry file
///
/// Every field is optional; an empty entry file is a valid manifest. The
/// plugin's name is always its directory name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Short description
    #[serde(default)]
    pub description: Option<String>,
    /// Version string
    #[serde(default)]
    pub version: Option<String>,
}

impl PluginManifest {
    /// Read and parse an entry file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
