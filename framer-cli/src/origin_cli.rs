//! `framer origin` - origin list edits, sync and release publishing

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::{info, warn};

use framer_core::registry::{
    MakerIdentity, ManifestStore, OriginClient, PackageBuilder, PublishOutcome, SyncEngine,
    MAKER_FILE,
};
use framer_core::settings::ProjectSettings;

/// Exactly one action per invocation
#[derive(Args, Debug)]
#[clap(group(
    ArgGroup::new("action")
        .required(true)
        .args(["add", "list", "del", "sync", "make"]),
))]
pub struct OriginCommand {
    /// Add an origin base URL
    #[clap(long, value_name = "URL")]
    add: Option<String>,

    /// List configured origins
    #[clap(long)]
    list: bool,

    /// Remove an origin base URL
    #[clap(long, value_name = "URL")]
    del: Option<String>,

    /// Fetch module metadata from every origin into the manifest
    #[clap(long)]
    sync: bool,

    /// Publish installed modules into the release directory
    #[clap(long)]
    make: bool,
}

impl OriginCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let store = ManifestStore::new(project_dir);

        if let Some(url) = self.add {
            execute_add(&store, &url)
        } else if let Some(url) = self.del {
            execute_del(&store, &url)
        } else if self.list {
            execute_list(&store)
        } else if self.sync {
            execute_sync(&store).await
        } else {
            execute_make(&store)
        }
    }
}

fn execute_add(store: &ManifestStore, url: &str) -> Result<()> {
    let mut manifest = store.load()?;
    manifest.add_origin(url)?;
    store.save(&manifest)?;
    println!("Added origin {url}");
    Ok(())
}

fn execute_del(store: &ManifestStore, url: &str) -> Result<()> {
    let mut manifest = store.load()?;
    manifest.remove_origin(url)?;
    store.save(&manifest)?;
    println!("Removed origin {url}");
    Ok(())
}

/// Table row for the origin list
#[derive(Tabled)]
struct OriginRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Origin")]
    url: String,
    #[tabled(rename = "Cached modules")]
    modules: usize,
}

fn execute_list(store: &ManifestStore) -> Result<()> {
    let manifest = store.load()?;

    if manifest.origins().is_empty() {
        println!("No origins configured.");
        return Ok(());
    }

    // module_map keys carry the origin name, not its URL; count by download prefix
    let rows: Vec<OriginRow> = manifest
        .origins()
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let prefix = format!("{}/", url.trim_end_matches('/'));
            let modules = manifest
                .module_map
                .values()
                .filter(|entry| {
                    entry
                        .versions
                        .values()
                        .any(|record| record.download.starts_with(&prefix))
                })
                .count();
            OriginRow {
                position: i + 1,
                url: url.clone(),
                modules,
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");
    Ok(())
}

async fn execute_sync(store: &ManifestStore) -> Result<()> {
    let settings = ProjectSettings::load(store.project_dir())?;
    let client = OriginClient::with_settings(&settings)?;

    let manifest = store.load()?;
    if manifest.origins.is_empty() {
        warn!("No origins configured; add one with `framer origin --add URL`");
    }
    info!(
        "Syncing {} origin(s) with {} retr(ies) per document",
        manifest.origins.len(),
        client.retries()
    );

    let report = SyncEngine::new(&client).run(store).await?;

    println!(
        "Synced {} origin(s), {} module entr(ies)",
        report.origins_synced.len(),
        report.entries.len()
    );
    for url in &report.origins_skipped {
        println!("Skipped unreachable origin {url}");
    }
    if !report.unavailable.is_empty() {
        println!(
            "{} document(s) were unavailable and recorded as null",
            report.unavailable.len()
        );
    }
    Ok(())
}

fn execute_make(store: &ManifestStore) -> Result<()> {
    let manifest = store.load()?;
    let settings = ProjectSettings::load(store.project_dir())?;

    let maker_path = store.project_dir().join(MAKER_FILE);
    let maker = MakerIdentity::load_or_prompt(&maker_path, prompt_maker_identity)?;

    let builder = PackageBuilder::new(store.project_dir()).with_exclude(settings.exclude);
    let report = builder.publish(&manifest.modules, &maker)?;

    for (module, outcome) in &report.outcomes {
        match outcome {
            PublishOutcome::Published { version } => println!("Published {module} {version}"),
            PublishOutcome::Skipped { version } => {
                println!("Skipped {module} {version} (already published)")
            }
        }
    }
    println!("Release written to {}", builder.release_dir().display());
    Ok(())
}

fn prompt_maker_identity() -> Result<MakerIdentity> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let mut ask = |question: &str| -> Result<String> {
        print!("{question}: ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let answer = lines
            .next()
            .context("No answer on stdin")?
            .context("Failed to read stdin")?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            anyhow::bail!("{question} must not be empty");
        }
        Ok(answer)
    };

    let name = ask("Maker name")?;
    let base = ask("Origin base URL")?;
    Ok(MakerIdentity { name, base })
}
