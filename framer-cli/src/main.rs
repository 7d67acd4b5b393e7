//! Framer - module registry and distribution tool
//!
//! Main entry point: parses the command line, sets up logging and
//! dispatches to the command implementations.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use framer_core::registry::{
    activation_order, DependencyGraph, DependencyValidator, LocalModuleInfo, ManifestStore,
    RequireSpec, LOCAL_DESCRIPTOR, REQUIRE_FILE,
};

mod origin_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "framer",
    about = "Track, sync and publish Framer modules",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Project directory containing framerpkg.json
    #[clap(long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Create an empty project manifest and the modules directory
    Init,

    /// Manage origins, sync their metadata or publish a release
    Origin(origin_cli::OriginCommand),

    /// Check every installed module against its requirements
    Check,
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    // Logs go to stderr so stdout only carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);
    debug!("Project directory: {}", cli.project_dir.display());

    match cli.command {
        Command::Init => init_command(&cli.project_dir),
        Command::Origin(command) => command.execute(&cli.project_dir).await,
        Command::Check => check_command(&cli.project_dir),
    }
}

fn init_command(project_dir: &Path) -> Result<()> {
    let store = ManifestStore::new(project_dir);
    if store.exists() {
        warn!(
            "Overwriting existing manifest at {}",
            store.path().display()
        );
    }

    store.init()?;
    println!("Initialized empty project in {}", project_dir.display());
    Ok(())
}

/// Table row for `framer check`
#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Hooker")]
    hooker: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn check_command(project_dir: &Path) -> Result<()> {
    let store = ManifestStore::new(project_dir);
    let manifest = store.load()?;
    let modules_dir = store.modules_dir();

    if manifest.modules.is_empty() {
        println!("No modules installed.");
        return Ok(());
    }

    let mut descriptors = std::collections::HashMap::new();
    for module in &manifest.modules {
        let path = modules_dir.join(module).join(LOCAL_DESCRIPTOR);
        match LocalModuleInfo::from_file(&path) {
            Ok(descriptor) => {
                descriptors.insert(module.clone(), descriptor);
            }
            Err(e) => warn!("{:#}", e),
        }
    }

    let versions = descriptors
        .iter()
        .map(|(name, d)| (name.clone(), d.version.clone()))
        .collect();
    let validator = DependencyValidator::from_manifest(&manifest).with_versions(versions);
    let order = activation_order(&manifest.modules, |m| {
        descriptors.get(m).map(|d| d.hooker).unwrap_or(false)
    });

    let mut graph = DependencyGraph::new();
    let mut rows = Vec::new();
    let mut problems = 0;

    for module in &order {
        let require_path = modules_dir.join(module).join(REQUIRE_FILE);
        let require = RequireSpec::from_file(&require_path)?;
        graph.add_module(module, &require);

        let status = if manifest.is_disabled(module) {
            "disabled".to_string()
        } else {
            match validator.check(module, &require) {
                Ok(()) => "ok".to_string(),
                Err(e) => {
                    problems += 1;
                    e.to_string()
                }
            }
        };

        let descriptor = descriptors.get(module);
        rows.push(CheckRow {
            module: module.clone(),
            version: descriptor
                .map(|d| d.version.clone())
                .unwrap_or_else(|| "?".to_string()),
            hooker: if descriptor.map(|d| d.hooker).unwrap_or(false) {
                "yes".to_string()
            } else {
                String::new()
            },
            status,
        });
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");

    if let Some(cycle) = graph.find_cycle() {
        println!("\nDependency cycle: {}", cycle.join(" -> "));
    }

    if problems > 0 {
        anyhow::bail!("{problems} module(s) cannot be activated");
    }

    info!("All enabled modules can be activated");
    Ok(())
}
