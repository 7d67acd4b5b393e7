//! Release publishing ("make")
//!
//! Builds a static origin tree from the locally installed modules:
//!
//! ```text
//! maker_release/
//!     map.json                     ← maker identity and module list
//!     <module>/info.json           ← published descriptor, append-only versions
//!     <module>/latest.txt
//!     <module>/<version>/require.json
//!     <module>/<version>/file.zip
//! ```
//!
//! A version that is already listed in `info.json` is skipped, so publishing
//! twice without local changes rewrites nothing but identical metadata.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::archive::build_archive;
use super::{
    LocalModuleInfo, ModuleInfo, OriginMap, RequireSpec, LOCAL_DESCRIPTOR, MODULES_DIR,
    RELEASE_DIR, REQUIRE_FILE,
};

/// Who publishes the release and where it will be served from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerIdentity {
    pub name: String,
    pub base: String,
}

impl MakerIdentity {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read maker identity: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse maker identity: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Load the cached identity, or ask for it once and cache the answer
    pub fn load_or_prompt<F>(path: &Path, prompt: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Self>,
    {
        if path.exists() {
            return Self::from_file(path);
        }

        let identity = prompt()?;
        identity.save(path)?;
        info!("Saved maker identity to {}", path.display());
        Ok(identity)
    }
}

/// Result of publishing one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new version was added to the release tree
    Published { version: String },

    /// The version was already published; nothing was written
    Skipped { version: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Per-module outcome, in installed order
    pub outcomes: Vec<(String, PublishOutcome)>,
}

impl PublishReport {
    pub fn published(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PublishOutcome::Published { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.published()
    }
}

/// Builds and updates the release tree of a project
pub struct PackageBuilder {
    modules_dir: PathBuf,
    release_dir: PathBuf,
    exclude: Vec<String>,
}

impl PackageBuilder {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            modules_dir: project_dir.join(MODULES_DIR),
            release_dir: project_dir.join(RELEASE_DIR),
            exclude: Vec::new(),
        }
    }

    /// Extra directory names to leave out of archives
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    /// Publish every module in installed order and rewrite map.json
    pub fn publish(&self, modules: &[String], maker: &MakerIdentity) -> Result<PublishReport> {
        let mut report = PublishReport::default();

        for module in modules {
            let outcome = self
                .publish_module(module)
                .with_context(|| format!("Failed to publish module '{module}'"))?;
            report.outcomes.push((module.clone(), outcome));
        }

        let map = OriginMap {
            name: maker.name.clone(),
            base: maker.base.clone(),
            modules: modules.to_vec(),
        };
        write_json(&self.release_dir.join("map.json"), &map)?;

        info!(
            "Release tree at {}: {} published, {} skipped",
            self.release_dir.display(),
            report.published(),
            report.skipped()
        );
        Ok(report)
    }

    fn publish_module(&self, module: &str) -> Result<PublishOutcome> {
        let module_dir = self.modules_dir.join(module);
        let local = LocalModuleInfo::from_file(&module_dir.join(LOCAL_DESCRIPTOR))?;
        let version = local.version.clone();

        let release_dir = self.release_dir.join(module);
        let info_path = release_dir.join("info.json");
        let mut published = if info_path.exists() {
            let content = std::fs::read_to_string(&info_path)
                .with_context(|| format!("Failed to read {}", info_path.display()))?;
            serde_json::from_str::<ModuleInfo>(&content)
                .with_context(|| format!("Failed to parse {}", info_path.display()))?
        } else {
            ModuleInfo::from_local(&local)
        };

        if published.has_version(&version) {
            info!("Skipping {} {}: already published", module, version);
            return Ok(PublishOutcome::Skipped { version });
        }

        let local_require = module_dir.join(REQUIRE_FILE);
        let require = RequireSpec::from_file(&local_require)?;
        debug!(
            "{} {} requires {} module(s)",
            module,
            version,
            require.dependencies.len()
        );

        published.name = local.name.clone();
        published.author = local.author.clone();
        published.description = local.description.clone();
        published.hooker = local.hooker;
        published.version = version.clone();
        published.versions.push(version.clone());

        let version_dir = release_dir.join(&version);
        std::fs::create_dir_all(&version_dir)
            .with_context(|| format!("Failed to create {}", version_dir.display()))?;

        // Copied verbatim so uninterpreted keys are released too
        let released_require = version_dir.join(REQUIRE_FILE);
        std::fs::copy(&local_require, &released_require).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                local_require.display(),
                released_require.display()
            )
        })?;

        let archive = build_archive(&module_dir, &version_dir.join("file.zip"), &self.exclude)?;
        debug!("{} {}: {} file(s) archived", module, version, archive.entries.len());

        write_json(&info_path, &published)?;
        let latest_path = release_dir.join("latest.txt");
        std::fs::write(&latest_path, &version)
            .with_context(|| format!("Failed to write {}", latest_path.display()))?;

        info!("Published {} {}", module, version);
        Ok(PublishOutcome::Published { version })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    content.push('\n');

    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
