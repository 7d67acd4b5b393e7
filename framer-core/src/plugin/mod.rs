//! Module activation
//!
//! Installed modules are not loaded dynamically. Each one registers a
//! factory in a [`PluginTable`] under its module name, and an
//! [`ActivationSession`] decides at boot which of them run and in what order:
//!
//! 1. load the manifest (a missing manifest is fatal)
//! 2. read each installed module's `module.json` for its hooker flag
//! 3. order hookers first, skip disabled modules
//! 4. gate each module on its `require.json`
//! 5. build the plugin from its factory and activate it

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span};

use crate::registry::{
    activation_order, ActivationError, DependencyValidator, LocalModuleInfo, ManifestStore,
    ProjectManifest, RegistryError, RequireSpec, LOCAL_DESCRIPTOR, REQUIRE_FILE,
};

/// What a module sees while it is being activated
pub struct ActivationContext<'s> {
    pub module: &'s str,
    pub info: &'s LocalModuleInfo,
    pub project_dir: &'s Path,

    /// Modules activated before this one, in activation order
    pub activated: &'s [String],
}

impl ActivationContext<'_> {
    pub fn is_active(&self, module: &str) -> bool {
        self.activated.iter().any(|m| m == module)
    }

    pub fn module_dir(&self) -> PathBuf {
        self.project_dir
            .join(crate::registry::MODULES_DIR)
            .join(self.module)
    }
}

/// Entry points of an activatable module
pub trait Plugin: Send {
    /// Called once per session, in activation order
    fn activate(&mut self, ctx: &ActivationContext<'_>) -> Result<()>;

    /// Optional command-line entry point; `None` means the module has none
    fn run_cli(&mut self, _args: &[String]) -> Option<Result<()>> {
        None
    }
}

/// Builds a fresh plugin instance
pub type PluginFactory = fn() -> Box<dyn Plugin>;

/// Registered plugin factories, keyed by module name
#[derive(Default)]
pub struct PluginTable {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, module: &str, factory: PluginFactory) -> Self {
        self.factories.insert(module.to_string(), factory);
        self
    }

    pub fn get(&self, module: &str) -> Option<PluginFactory> {
        self.factories.get(module).copied()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Existence checks memoized for the lifetime of one session
#[derive(Debug, Default)]
pub struct FileCheckCache {
    files: HashMap<PathBuf, bool>,
    dirs: HashMap<PathBuf, bool>,
}

impl FileCheckCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_file(&mut self, path: &Path) -> bool {
        *self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| path.is_file())
    }

    pub fn is_dir(&mut self, path: &Path) -> bool {
        *self
            .dirs
            .entry(path.to_path_buf())
            .or_insert_with(|| path.is_dir())
    }

    /// Record that a directory now exists
    pub fn mark_dir(&mut self, path: &Path) {
        self.dirs.insert(path.to_path_buf(), true);
    }
}

/// An activated module
pub struct ActivatedPlugin {
    pub name: String,
    pub info: LocalModuleInfo,
    plugin: Box<dyn Plugin>,
}

/// One boot of a project's modules
pub struct ActivationSession {
    project_dir: PathBuf,
    manifest: ProjectManifest,
    activated: Vec<ActivatedPlugin>,
    files: FileCheckCache,
}

impl ActivationSession {
    /// Activate every enabled module of the project
    ///
    /// Stops at the first module that fails its gate or its activation.
    pub fn boot(project_dir: &Path, table: &PluginTable) -> Result<Self> {
        let store = ManifestStore::new(project_dir);
        let mut files = FileCheckCache::new();

        if !files.is_file(store.path()) {
            return Err(RegistryError::ManifestMissing {
                path: store.path().to_path_buf(),
            }
            .into());
        }
        let manifest = store.load()?;

        let modules_dir = store.modules_dir();
        if !files.is_dir(&modules_dir) {
            std::fs::create_dir_all(&modules_dir).with_context(|| {
                format!("Failed to create modules directory: {}", modules_dir.display())
            })?;
            files.mark_dir(&modules_dir);
        }

        info!("Installed modules: {}", manifest.modules.join(", "));
        if !manifest.disabled.is_empty() {
            info!("Disabled modules: {}", manifest.disabled.join(", "));
        }

        let mut descriptors = HashMap::new();
        for module in &manifest.modules {
            let path = modules_dir.join(module).join(LOCAL_DESCRIPTOR);
            let descriptor = LocalModuleInfo::from_file(&path)?;
            debug!(
                "{}: version {}, hooker {}",
                module, descriptor.version, descriptor.hooker
            );
            descriptors.insert(module.clone(), descriptor);
        }

        let versions = descriptors
            .iter()
            .map(|(name, d)| (name.clone(), d.version.clone()))
            .collect();
        let validator = DependencyValidator::from_manifest(&manifest).with_versions(versions);

        let order = activation_order(&manifest.modules, |m| {
            descriptors.get(m).map(|d| d.hooker).unwrap_or(false)
        });

        let mut activated: Vec<ActivatedPlugin> = Vec::new();
        let mut activated_names: Vec<String> = Vec::new();

        for module in &order {
            if manifest.is_disabled(module) {
                debug!("Skipping disabled module {}", module);
                continue;
            }

            let require_path = modules_dir.join(module).join(REQUIRE_FILE);
            let require = RequireSpec::from_file(&require_path)?;
            validator.check(module, &require)?;

            let factory = table
                .get(module)
                .ok_or_else(|| ActivationError::NoEntryPoint(module.clone()))?;

            let Some(info) = descriptors.remove(module) else {
                return Err(ActivationError::NotInstalled(module.clone()).into());
            };

            let _span = info_span!("module", name = %module).entered();
            info!("Activating module {}", module);

            let mut plugin = factory();
            let ctx = ActivationContext {
                module,
                info: &info,
                project_dir,
                activated: &activated_names,
            };
            plugin
                .activate(&ctx)
                .with_context(|| format!("Module {module} failed to activate"))?;

            activated_names.push(module.clone());
            activated.push(ActivatedPlugin {
                name: module.clone(),
                info,
                plugin,
            });
        }

        info!("Activated {} module(s)", activated.len());
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            manifest,
            activated,
            files,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    /// Names of activated modules, in activation order
    pub fn activated(&self) -> Vec<&str> {
        self.activated.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn plugin(&self, module: &str) -> Option<&ActivatedPlugin> {
        self.activated.iter().find(|p| p.name == module)
    }

    pub fn files(&mut self) -> &mut FileCheckCache {
        &mut self.files
    }

    /// Run a module's command-line entry point
    pub fn run_cli(&mut self, module: &str, args: &[String]) -> Result<()> {
        let plugin = self
            .activated
            .iter_mut()
            .find(|p| p.name == module)
            .ok_or_else(|| ActivationError::NotInstalled(module.to_string()))?;

        match plugin.plugin.run_cli(args) {
            Some(result) => result,
            None => anyhow::bail!("Module {module} has no command-line entry point"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MODULES_DIR;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Quiet;

    impl Plugin for Quiet {
        fn activate(&mut self, _ctx: &ActivationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    /// Requires `base` to have been activated first
    struct NeedsBase;

    impl Plugin for NeedsBase {
        fn activate(&mut self, ctx: &ActivationContext<'_>) -> Result<()> {
            anyhow::ensure!(ctx.is_active("base"), "base is not active yet");
            Ok(())
        }

        fn run_cli(&mut self, args: &[String]) -> Option<Result<()>> {
            Some(if args.is_empty() {
                Err(anyhow::anyhow!("no arguments"))
            } else {
                Ok(())
            })
        }
    }

    struct Broken;

    impl Plugin for Broken {
        fn activate(&mut self, _ctx: &ActivationContext<'_>) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn quiet() -> Box<dyn Plugin> {
        Box::new(Quiet)
    }

    fn needs_base() -> Box<dyn Plugin> {
        Box::new(NeedsBase)
    }

    fn broken() -> Box<dyn Plugin> {
        Box::new(Broken)
    }

    fn project(modules: &[(&str, bool, &str)], disabled: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path());
        let mut manifest = store.init().unwrap();

        for (name, hooker, deps) in modules {
            let dir = temp_dir.path().join(MODULES_DIR).join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join(LOCAL_DESCRIPTOR),
                format!(r#"{{"name": "{name}", "version": "1.0.0", "hooker": {hooker}}}"#),
            )
            .unwrap();
            std::fs::write(dir.join(REQUIRE_FILE), deps).unwrap();
            manifest.modules.push(name.to_string());
        }
        manifest.disabled = disabled.iter().map(|s| s.to_string()).collect();
        store.save(&manifest).unwrap();
        temp_dir
    }

    const NO_DEPS: &str = r#"{"dependencies": []}"#;

    #[test]
    fn test_boot_orders_hookers_first_and_skips_disabled() {
        let dir = project(
            &[
                ("A", true, NO_DEPS),
                ("B", false, NO_DEPS),
                ("C", true, NO_DEPS),
                ("D", false, NO_DEPS),
            ],
            &["D"],
        );
        let table = PluginTable::new()
            .register("A", quiet)
            .register("B", quiet)
            .register("C", quiet);

        let session = ActivationSession::boot(dir.path(), &table).unwrap();
        assert_eq!(session.activated(), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_boot_without_manifest_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = ActivationSession::boot(temp_dir.path(), &PluginTable::new())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::ManifestMissing { .. })
        ));
    }

    #[test]
    fn test_boot_creates_missing_modules_dir() {
        let temp_dir = TempDir::new().unwrap();
        ManifestStore::new(temp_dir.path())
            .save(&ProjectManifest::new())
            .unwrap();

        let session = ActivationSession::boot(temp_dir.path(), &PluginTable::new()).unwrap();
        assert!(session.activated().is_empty());
        assert!(temp_dir.path().join(MODULES_DIR).is_dir());
    }

    #[test]
    fn test_boot_gates_on_disabled_dependency() {
        let dir = project(
            &[
                ("base", false, NO_DEPS),
                ("app", false, r#"{"dependencies": ["base"]}"#),
            ],
            &["base"],
        );
        let table = PluginTable::new()
            .register("base", quiet)
            .register("app", needs_base);

        let err = ActivationSession::boot(dir.path(), &table).err().unwrap();
        assert_eq!(
            err.downcast_ref::<ActivationError>(),
            Some(&ActivationError::DependencyDisabled {
                module: "app".to_string(),
                dependency: "base".to_string(),
            })
        );
    }

    #[test]
    fn test_boot_fails_when_require_document_is_missing() {
        let dir = project(&[("a", false, NO_DEPS)], &[]);
        std::fs::remove_file(dir.path().join(MODULES_DIR).join("a").join(REQUIRE_FILE))
            .unwrap();
        let table = PluginTable::new().register("a", quiet);

        let err = ActivationSession::boot(dir.path(), &table).err().unwrap();
        assert!(format!("{err:#}").contains("Failed to read requirements"));
    }

    #[test]
    fn test_boot_requires_entry_point_for_active_modules_only() {
        let dir = project(&[("a", false, NO_DEPS), ("off", false, NO_DEPS)], &["off"]);

        let table = PluginTable::new().register("a", quiet);
        assert!(ActivationSession::boot(dir.path(), &table).is_ok());

        let err = ActivationSession::boot(dir.path(), &PluginTable::new())
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<ActivationError>(),
            Some(&ActivationError::NoEntryPoint("a".to_string()))
        );
    }

    #[test]
    fn test_boot_reports_activation_failure() {
        let dir = project(&[("bad", false, NO_DEPS)], &[]);
        let table = PluginTable::new().register("bad", broken);

        let err = ActivationSession::boot(dir.path(), &table).err().unwrap();
        assert!(err.to_string().contains("Module bad failed to activate"));
    }

    #[test]
    fn test_run_cli_entry_point() {
        let dir = project(
            &[
                ("base", false, NO_DEPS),
                ("app", false, r#"{"dependencies": {"base": "^1"}}"#),
            ],
            &[],
        );
        let table = PluginTable::new()
            .register("base", quiet)
            .register("app", needs_base);
        let mut session = ActivationSession::boot(dir.path(), &table).unwrap();

        assert!(session.run_cli("app", &["serve".to_string()]).is_ok());
        assert!(session.run_cli("app", &[]).is_err());
        assert!(session.run_cli("base", &[]).is_err());
        assert_eq!(session.plugin("app").unwrap().info.version, "1.0.0");
    }

    #[test]
    fn test_file_check_cache_memoizes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("later.txt");
        let mut cache = FileCheckCache::new();

        assert!(!cache.is_file(&path));
        std::fs::write(&path, "now it exists").unwrap();
        assert!(!cache.is_file(&path));
        assert!(FileCheckCache::new().is_file(&path));
    }
}
