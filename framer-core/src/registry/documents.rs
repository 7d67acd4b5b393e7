//! Registry documents shared by local modules, origins and releases
//!
//! - `require.json`: a module's declared dependencies
//! - `module.json`: the local descriptor of an installed module
//! - `info.json`: the published descriptor with its version history
//! - `map.json`: the document at the root of an origin

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A module's requirements (require.json)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireSpec {
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Keys the registry does not interpret (e.g. `pip_dependencies`),
    /// kept so they survive publish and sync
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Declared dependencies: a plain list of names, or names mapped to a
/// version constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependencies {
    List(Vec<String>),
    Map(BTreeMap<String, Option<String>>),
}

impl Default for Dependencies {
    fn default() -> Self {
        Dependencies::List(Vec::new())
    }
}

impl Dependencies {
    /// Iterate `(name, constraint)` pairs in declaration order
    ///
    /// A missing, empty or `*` constraint is reported as `None`.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&str, Option<&str>)> + '_> {
        match self {
            Dependencies::List(names) => Box::new(names.iter().map(|n| (n.as_str(), None))),
            Dependencies::Map(map) => Box::new(map.iter().map(|(name, constraint)| {
                let constraint = constraint
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty() && *c != "*");
                (name.as_str(), constraint)
            })),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        match self {
            Dependencies::List(names) => names.len(),
            Dependencies::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequireSpec {
    pub fn new(dependencies: Dependencies) -> Self {
        Self {
            dependencies,
            extra: serde_json::Map::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements: {}", path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse requirements: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid require.json")
    }
}

/// Local descriptor of an installed module (module.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModuleInfo {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: String,

    /// Installs process-wide hooks and must activate first
    #[serde(default)]
    pub hooker: bool,
}

impl LocalModuleInfo {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read module descriptor: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse module descriptor: {}", path.display()))
    }
}

/// Published module descriptor (info.json)
///
/// Origins may serve a reduced form with only `author`, `description` and
/// `versions`, so every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub hooker: bool,

    /// Every published version, oldest first. Append-only.
    #[serde(default)]
    pub versions: Vec<String>,
}

impl ModuleInfo {
    /// Start the published descriptor for a module that has never been released
    pub fn from_local(local: &LocalModuleInfo) -> Self {
        Self {
            name: local.name.clone(),
            author: local.author.clone(),
            description: local.description.clone(),
            version: local.version.clone(),
            hooker: local.hooker,
            versions: Vec::new(),
        }
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }
}

/// Document at an origin root (map.json)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMap {
    pub name: String,

    #[serde(default)]
    pub base: String,

    #[serde(default)]
    pub modules: Vec<String>,
}
