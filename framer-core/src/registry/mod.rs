//! Framer registry - module tracking, origin sync and release publishing
//!
//! # Overview
//!
//! The registry keeps track of which modules a project has installed,
//! mirrors module metadata from remote origins, and publishes local modules
//! as a static origin tree that other projects can sync from.
//!
//! # Architecture
//!
//! ```text
//! Origin (static HTTP)
//!     │
//!     ├── map.json                 ← origin name and modules
//!     └── <module>/...             ← info, latest, require, file.zip
//!            │
//!            ▼  SyncEngine
//!     framerpkg.json               ← manifest: modules, origins, module_map
//!            │
//!            ▼  DependencyValidator
//!     framer_modules/<module>/     ← installed modules
//!            │
//!            ▼  PackageBuilder
//!     maker_release/               ← our own origin tree
//! ```

mod archive;
mod documents;
mod error;
mod manifest;
mod origin;
mod publish;
mod sync;
mod validator;

pub use archive::{build_archive, ArchiveSummary, EXCLUDED_DIRS};
pub use documents::{Dependencies, LocalModuleInfo, ModuleInfo, OriginMap, RequireSpec};
pub use error::{ActivationError, FetchError, RegistryError};
pub use manifest::{qualified_key, ManifestStore, ModuleMapEntry, ProjectManifest, VersionRecord};
pub use origin::{
    archive_url, info_url, latest_url, map_url, require_url, resolve_description, OriginClient,
    OriginSource, USER_AGENT,
};
pub use publish::{MakerIdentity, PackageBuilder, PublishOutcome, PublishReport};
pub use sync::{SyncEngine, SyncReport};
pub use validator::{activation_order, DependencyGraph, DependencyValidator};

/// Project manifest file name
pub const MANIFEST_FILE: &str = "framerpkg.json";

/// Directory holding installed modules
pub const MODULES_DIR: &str = "framer_modules";

/// Directory the release tree is published into
pub const RELEASE_DIR: &str = "maker_release";

/// Cached maker identity
pub const MAKER_FILE: &str = "origin-maker.json";

/// Local descriptor inside each module directory
pub const LOCAL_DESCRIPTOR: &str = "module.json";

/// Requirements file inside each module directory
pub const REQUIRE_FILE: &str = "require.json";
