//! Plugin discovery - scan the plugins root for entry files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{Error, Result};

/// A plugin found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    /// Plugin name (the directory name)
    pub name: String,
    /// Directory containing the plugin
    pub dir: PathBuf,
    /// Path to the entry file
    pub entry_point: PathBuf,
    /// Set once the loader has initialized the plugin
    pub loaded: bool,
    /// Load failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Description from the entry file, or the plugin's own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version from the entry file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PluginDescriptor {
    /// One-line listing: name, version, load status, then the error or
    /// description
    #[must_use]
    pub fn summary(&self) -> String {
        let status = if self.loaded { "loaded" } else { "failed" };
        let version = self.version.as_deref().unwrap_or("-");
        let detail = self
            .error
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or_default();
        format!("{:<24} {version:<10} {status:<8} {detail}", self.name)
            .trim_end()
            .to_string()
    }
}

/// Scan `plugins_root` for plugins
///
/// Looks at immediate subdirectories only. A subdirectory is a plugin when it
/// contains `entry_file`; anything else is skipped without error. Results are
/// sorted by name.
///
/// # Errors
///
/// Returns [`Error::Config`] if `plugins_root` is missing, is not a directory,
/// or cannot be listed
pub fn discover(plugins_root: &Path, entry_file: &str) -> Result<Vec<PluginDescriptor>> {
    if !plugins_root.is_dir() {
        return Err(Error::Config(format!(
            "plugins root does not exist or is not a directory: {}",
            plugins_root.display()
        )));
    }

    let entries = std::fs::read_dir(plugins_root).map_err(|e| {
        Error::Config(format!(
            "failed to read plugins root {}: {e}",
            plugins_root.display()
        ))
    })?;

    let mut found = BTreeMap::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %plugins_root.display(), error = %e, "skipping unreadable plugin entry");
                continue;
            }
        };

        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let entry_point = dir.join(entry_file);
        if !entry_point.is_file() {
            tracing::trace!(path = %dir.display(), "no entry file, not a plugin");
            continue;
        }

        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(String::from) else {
            tracing::warn!(path = %dir.display(), "plugin directory name is not valid UTF-8, skipping");
            continue;
        };

        tracing::debug!(plugin = %name, path = %dir.display(), "discovered plugin");
        found.insert(
            name.clone(),
            PluginDescriptor {
                name,
                dir,
                entry_point,
                loaded: false,
                error: None,
                description: None,
                version: None,
            },
        );
    }

    Ok(found.into_values().collect())
}
