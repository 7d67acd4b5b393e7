//! Project manifest management (framerpkg.json)
//!
//! The manifest is the single source of truth for installed and disabled
//! modules, configured origins, and the module metadata cached by the last
//! sync. It is always read and written as a whole document.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::RegistryError;
use super::{RequireSpec, MANIFEST_FILE, MODULES_DIR};

/// The project manifest (framerpkg.json)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Installed modules, in the order they were installed
    #[serde(default)]
    pub modules: Vec<String>,

    /// Installed modules that must not be activated
    #[serde(default, rename = "disable")]
    pub disabled: Vec<String>,

    /// Origin base URLs, synced in this order
    #[serde(default)]
    pub origins: Vec<String>,

    /// Remote metadata keyed by `<module>@<originName>`
    #[serde(default)]
    pub module_map: BTreeMap<String, ModuleMapEntry>,
}

/// Metadata for one module as offered by one origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMapEntry {
    pub author: Option<String>,

    /// Plain text, or an absolute readme URL when the origin sent `@relpath`
    pub description: Option<String>,

    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,

    pub latest: Option<String>,
}

/// One published version of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Archive URL
    pub download: String,

    /// Requirements, or null when the origin did not serve them
    pub require: Option<RequireSpec>,
}

/// Build the qualified key used in `module_map`
pub fn qualified_key(module: &str, origin_name: &str) -> String {
    format!("{module}@{origin_name}")
}

impl ProjectManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the manifest invariants
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(stray) = self.disabled.iter().find(|m| !self.modules.contains(m)) {
            return Err(format!("disabled module '{stray}' is not installed"));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.as_str()) {
                return Err(format!("module '{module}' is listed more than once"));
            }
        }

        let mut seen = HashSet::new();
        for origin in &self.origins {
            if !seen.insert(origin.trim_end_matches('/')) {
                return Err(format!("origin '{origin}' is listed more than once"));
            }
        }

        Ok(())
    }

    pub fn is_installed(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    pub fn is_disabled(&self, module: &str) -> bool {
        self.disabled.iter().any(|m| m == module)
    }

    /// Origin base URLs in sync order
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Add an origin to the end of the sync order
    pub fn add_origin(&mut self, url: &str) -> std::result::Result<(), RegistryError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RegistryError::InvalidOriginUrl(url.to_string()));
        }

        let base = url.trim_end_matches('/');
        if self.origins.iter().any(|o| o.trim_end_matches('/') == base) {
            return Err(RegistryError::OriginExists(url.to_string()));
        }

        self.origins.push(url.to_string());
        Ok(())
    }

    /// Remove a configured origin
    pub fn remove_origin(&mut self, url: &str) -> std::result::Result<(), RegistryError> {
        let initial_len = self.origins.len();
        let base = url.trim_end_matches('/');
        self.origins.retain(|o| o.trim_end_matches('/') != base);

        if self.origins.len() == initial_len {
            return Err(RegistryError::OriginNotFound(url.to_string()));
        }

        Ok(())
    }

    /// Mark an installed module as disabled
    pub fn disable_module(&mut self, module: &str) -> std::result::Result<(), RegistryError> {
        if !self.is_installed(module) {
            return Err(RegistryError::UnknownModule(module.to_string()));
        }

        if !self.is_disabled(module) {
            self.disabled.push(module.to_string());
        }
        Ok(())
    }

    /// Clear the disabled mark on an installed module
    pub fn enable_module(&mut self, module: &str) -> std::result::Result<(), RegistryError> {
        if !self.is_installed(module) {
            return Err(RegistryError::UnknownModule(module.to_string()));
        }

        self.disabled.retain(|m| m != module);
        Ok(())
    }

    /// Replace module_map entries with freshly synced ones
    ///
    /// Each staged key overwrites the stored entry wholesale; keys that were
    /// not staged are left untouched.
    pub fn apply_entries(&mut self, staged: BTreeMap<String, ModuleMapEntry>) {
        for (key, entry) in staged {
            self.module_map.insert(key, entry);
        }
    }
}

/// Loads and saves the project manifest for one project directory
#[derive(Debug, Clone)]
pub struct ManifestStore {
    project_dir: PathBuf,
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let path = project_dir.join(MANIFEST_FILE);
        Self { project_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.project_dir.join(MODULES_DIR)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write an empty manifest and create the modules directory
    ///
    /// Overwrites an existing manifest: this is the full-reinit path.
    pub fn init(&self) -> Result<ProjectManifest> {
        let manifest = ProjectManifest::new();
        self.save(&manifest)?;

        let modules_dir = self.modules_dir();
        std::fs::create_dir_all(&modules_dir).with_context(|| {
            format!(
                "Failed to create modules directory: {}",
                modules_dir.display()
            )
        })?;

        info!("Initialized project manifest at {}", self.path.display());
        Ok(manifest)
    }

    /// Load the manifest
    ///
    /// Fails with [`RegistryError::ManifestMissing`] when the file is absent.
    pub fn load(&self) -> Result<ProjectManifest> {
        if !self.exists() {
            return Err(RegistryError::ManifestMissing {
                path: self.path.clone(),
            }
            .into());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read manifest: {}", self.path.display()))?;

        let manifest: ProjectManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", self.path.display()))?;

        manifest
            .validate()
            .map_err(|reason| RegistryError::ManifestInvalid {
                path: self.path.clone(),
                reason,
            })?;

        debug!(
            "Loaded manifest: {} module(s), {} origin(s), {} cached entr(ies)",
            manifest.modules.len(),
            manifest.origins.len(),
            manifest.module_map.len()
        );
        Ok(manifest)
    }

    /// Save the full manifest, replacing the file in one rename
    pub fn save(&self, manifest: &ProjectManifest) -> Result<()> {
        let mut content =
            serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
        content.push('\n');

        std::fs::create_dir_all(&self.project_dir).with_context(|| {
            format!(
                "Failed to create project directory: {}",
                self.project_dir.display()
            )
        })?;

        let mut temp_file = NamedTempFile::new_in(&self.project_dir)
            .with_context(|| format!("Failed to stage manifest in {}", self.project_dir.display()))?;
        temp_file
            .write_all(content.as_bytes())
            .context("Failed to write staged manifest")?;
        temp_file
            .persist(&self.path)
            .with_context(|| format!("Failed to write manifest: {}", self.path.display()))?;

        debug!("Saved manifest to {}", self.path.display());
        Ok(())
    }
}
