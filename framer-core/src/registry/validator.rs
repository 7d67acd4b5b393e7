//! Activation gate and ordering
//!
//! The gate only looks at local state: the installed and disabled sets plus
//! the versions of installed modules. Remote metadata in `module_map` is
//! never consulted. There is no transitive check and the gate does not
//! reject cycles; [`DependencyGraph`] reports them separately.

use semver::{Version, VersionReq};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::error::ActivationError;
use super::manifest::ProjectManifest;
use super::RequireSpec;

/// Checks whether a module may be activated
#[derive(Debug, Clone)]
pub struct DependencyValidator<'a> {
    installed: &'a [String],
    disabled: &'a [String],
    versions: HashMap<String, String>,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(installed: &'a [String], disabled: &'a [String]) -> Self {
        Self {
            installed,
            disabled,
            versions: HashMap::new(),
        }
    }

    pub fn from_manifest(manifest: &'a ProjectManifest) -> Self {
        Self::new(&manifest.modules, &manifest.disabled)
    }

    /// Supply local versions of installed modules for constraint checks
    pub fn with_versions(mut self, versions: HashMap<String, String>) -> Self {
        self.versions = versions;
        self
    }

    fn is_installed(&self, module: &str) -> bool {
        self.installed.iter().any(|m| m == module)
    }

    fn is_disabled(&self, module: &str) -> bool {
        self.disabled.iter().any(|m| m == module)
    }

    /// Gate a module against its requirements; the first problem wins
    pub fn check(&self, module: &str, require: &RequireSpec) -> Result<(), ActivationError> {
        if !self.is_installed(module) {
            return Err(ActivationError::NotInstalled(module.to_string()));
        }

        if self.is_disabled(module) {
            return Err(ActivationError::Disabled(module.to_string()));
        }

        for (dependency, constraint) in require.dependencies.iter() {
            if !self.is_installed(dependency) {
                return Err(ActivationError::MissingDependency {
                    module: module.to_string(),
                    dependency: dependency.to_string(),
                });
            }

            if self.is_disabled(dependency) {
                return Err(ActivationError::DependencyDisabled {
                    module: module.to_string(),
                    dependency: dependency.to_string(),
                });
            }

            if let Some(constraint) = constraint {
                self.check_constraint(module, dependency, constraint)?;
            }
        }

        Ok(())
    }

    fn check_constraint(
        &self,
        module: &str,
        dependency: &str,
        constraint: &str,
    ) -> Result<(), ActivationError> {
        let requirement =
            VersionReq::parse(constraint).map_err(|e| ActivationError::InvalidConstraint {
                module: module.to_string(),
                dependency: dependency.to_string(),
                constraint: constraint.to_string(),
                reason: e.to_string(),
            })?;

        let Some(actual) = self.versions.get(dependency) else {
            warn!(
                "Cannot check {} {} for {}: local version unknown",
                dependency, constraint, module
            );
            return Ok(());
        };

        let version = match Version::parse(actual) {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    "Cannot check {} {} for {}: version '{}' is not semver ({})",
                    dependency, constraint, module, actual, e
                );
                return Ok(());
            }
        };

        if !requirement.matches(&version) {
            return Err(ActivationError::IncompatibleDependency {
                module: module.to_string(),
                dependency: dependency.to_string(),
                constraint: constraint.to_string(),
                actual: actual.clone(),
            });
        }

        Ok(())
    }
}

/// Order modules for activation
///
/// Each hooker is moved to the front as it is encountered, so hookers end
/// up in reverse encounter order ahead of everything else. Non-hookers keep
/// their relative order.
pub fn activation_order<F>(modules: &[String], is_hooker: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut ordered = Vec::with_capacity(modules.len());
    for module in modules {
        if is_hooker(module) {
            ordered.insert(0, module.clone());
        } else {
            ordered.push(module.clone());
        }
    }
    ordered
}

/// Dependency edges between local modules, for cycle reporting
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: &str, require: &RequireSpec) {
        let dependencies = require
            .dependencies
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.edges.insert(module.to_string(), dependencies);
    }

    /// Find one dependency cycle, returned as a closed path (`a → b → a`)
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for start in self.edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'g>(
        &'g self,
        node: &'g str,
        marks: &mut HashMap<&'g str, Mark>,
        path: &mut Vec<&'g str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Visiting);
        path.push(node);

        if let Some(dependencies) = self.edges.get(node) {
            for dependency in dependencies {
                match marks.get(dependency.as_str()) {
                    Some(Mark::Visiting) => {
                        let start = path.iter().position(|n| *n == dependency.as_str())?;
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dependency.clone());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = self.visit(dependency, marks, path) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        None
    }
}
