//! Saved resource state between CLI invocations.
//!
//! The file holds one JSON envelope:
//!
//! ```text
//! {"isNew": false, "savedAt": "<rfc3339>", "resourceManager": {<kind>: {"elements": [...], "deleted": [...]}}}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use piilop_core::Result;
use piilop_resources::ResourceManagerRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// On-disk envelope around a registry snapshot
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFile {
    /// Always `false` once written
    #[serde(default)]
    pub is_new: bool,
    /// When the snapshot was taken
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Output of [`ResourceManagerRegistry::save`]
    pub resource_manager: Value,
}

/// `$HOME/.piilop/state.json`, or `./.piilop-state.json` without a home directory.
pub fn default_state_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".piilop").join("state.json"),
        _ => PathBuf::from(".piilop-state.json"),
    }
}

/// Replace the registry's state with the snapshot saved at `path`.
pub fn load(path: &Path, resources: &ResourceManagerRegistry) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    let file: SaveFile = serde_json::from_str(&contents)?;
    debug!(path = %path.display(), saved_at = ?file.saved_at, "loading saved state");
    resources.load(&file.resource_manager)
}

/// Write the registry's state to `path`, creating parent directories.
pub fn save(path: &Path, resources: &ResourceManagerRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = SaveFile {
        is_new: false,
        saved_at: Some(Utc::now()),
        resource_manager: resources.save()?,
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    debug!(path = %path.display(), "saved state");
    Ok(())
}
