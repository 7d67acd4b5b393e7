//! Registry error types with clear, actionable messages

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by manifest and origin-list operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The project manifest does not exist yet
    #[error("No {} found at {}.\n\nInitialize the project first:\n  framer init", crate::registry::MANIFEST_FILE, path.display())]
    ManifestMissing { path: PathBuf },

    /// The manifest parsed but breaks one of its invariants
    #[error("Invalid project manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    /// The origin URL is already configured
    #[error("Origin '{0}' is already configured")]
    OriginExists(String),

    /// The origin URL is not configured
    #[error("Origin '{0}' is not configured")]
    OriginNotFound(String),

    /// The origin URL is not an http(s) URL
    #[error("Origin URL must start with http:// or https:// (got '{0}')")]
    InvalidOriginUrl(String),

    /// A module edit named a module that is not installed
    #[error("Module '{0}' is not installed")]
    UnknownModule(String),
}

/// Errors that stop a single module from being activated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Module {0} is not installed.")]
    NotInstalled(String),

    #[error("Module {0} is disabled.")]
    Disabled(String),

    #[error("Module {module} require {dependency}, but {dependency} not installed.")]
    MissingDependency { module: String, dependency: String },

    #[error("Module {module} require {dependency}, but {dependency} disabled.")]
    DependencyDisabled { module: String, dependency: String },

    #[error("Module {module} require {dependency} {constraint}, but {dependency} {actual} is installed.")]
    IncompatibleDependency {
        module: String,
        dependency: String,
        constraint: String,
        actual: String,
    },

    #[error("Module {module} declares an invalid version constraint '{constraint}' for {dependency}: {reason}")]
    InvalidConstraint {
        module: String,
        dependency: String,
        constraint: String,
        reason: String,
    },

    #[error("Module {0} has no registered entry point.")]
    NoEntryPoint(String),
}

/// A registry document could not be fetched from an origin
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Every attempt failed
    #[error("{url} unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The operator interrupted the fetch
    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}
