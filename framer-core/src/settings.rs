//! Project settings (framer.yml)
//!
//! Optional per-project tuning for origin fetches and release archives.
//! A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of fetch retries per document
pub const DEFAULT_RETRIES: u32 = 3;

/// Default HTTP timeout for a single attempt
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Settings file name inside the project directory
pub const SETTINGS_FILE: &str = "framer.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Extra attempts after the first failed fetch
    pub retries: u32,

    /// Timeout for a single HTTP attempt
    pub timeout_seconds: u64,

    /// Additional directory names left out of release archives
    pub exclude: Vec<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            exclude: Vec::new(),
        }
    }
}

impl ProjectSettings {
    /// Load `framer.yml` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self> {
        Self::load_from_path(&project_dir.join(SETTINGS_FILE))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;

        // An empty file is valid YAML for "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }
}
