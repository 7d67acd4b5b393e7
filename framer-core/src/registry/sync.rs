//! Origin synchronization
//!
//! Walks every configured origin in order, rebuilds one [`ModuleMapEntry`]
//! per offered module and writes the manifest once at the end of the pass.
//! Unreachable documents degrade the affected field to null; a cancelled
//! fetch aborts the pass and nothing is written.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::manifest::{qualified_key, ManifestStore, ModuleMapEntry, ProjectManifest, VersionRecord};
use super::origin::{
    archive_url, info_url, latest_url, map_url, require_url, resolve_description, OriginSource,
};
use super::{OriginMap, RequireSpec};

/// Module info as served by an origin; every field may be absent
#[derive(Debug, Deserialize)]
struct RemoteModuleInfo {
    author: Option<String>,
    description: Option<String>,
    #[serde(default)]
    versions: Vec<String>,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Names of origins whose map was fetched
    pub origins_synced: Vec<String>,

    /// Base URLs of origins whose map was unavailable
    pub origins_skipped: Vec<String>,

    /// Qualified keys staged during the pass
    pub entries: Vec<String>,

    /// Documents that could not be fetched or parsed
    pub unavailable: Vec<String>,
}

/// Orchestrates origin fetches and merges the results into the manifest
pub struct SyncEngine<'a> {
    source: &'a dyn OriginSource,
}

impl<'a> SyncEngine<'a> {
    pub fn new(source: &'a dyn OriginSource) -> Self {
        Self { source }
    }

    /// Load the manifest, sync every origin and save the manifest once
    pub async fn run(&self, store: &ManifestStore) -> Result<SyncReport> {
        let mut manifest = store.load()?;
        let report = self.sync_manifest(&mut manifest).await?;
        store.save(&manifest)?;

        info!(
            "Sync complete: {} origin(s), {} module entr(ies), {} unavailable document(s)",
            report.origins_synced.len(),
            report.entries.len(),
            report.unavailable.len()
        );
        Ok(report)
    }

    /// Sync the manifest's origins and apply staged entries in memory
    ///
    /// On error the manifest is left untouched.
    pub async fn sync_manifest(&self, manifest: &mut ProjectManifest) -> Result<SyncReport> {
        let (staged, report) = self.stage(&manifest.origins).await?;
        manifest.apply_entries(staged);
        Ok(report)
    }

    /// Fetch every origin in order and build fresh entries without applying them
    pub async fn stage(
        &self,
        origins: &[String],
    ) -> Result<(BTreeMap<String, ModuleMapEntry>, SyncReport)> {
        let mut staged = BTreeMap::new();
        let mut report = SyncReport::default();

        for base in origins {
            self.sync_origin(base, &mut staged, &mut report).await?;
        }

        Ok((staged, report))
    }

    async fn sync_origin(
        &self,
        base: &str,
        staged: &mut BTreeMap<String, ModuleMapEntry>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let Some(map) = self.fetch_json::<OriginMap>(&map_url(base), report).await? else {
            warn!("Skipping origin {}: map.json unavailable", base);
            report.origins_skipped.push(base.to_string());
            return Ok(());
        };

        info!(
            "Syncing origin '{}' ({} module(s)) from {}",
            map.name,
            map.modules.len(),
            base
        );

        for module in &map.modules {
            let entry = self.sync_module(base, module, report).await?;
            let key = qualified_key(module, &map.name);
            debug!(
                "Staged {} ({} version(s), latest {:?})",
                key,
                entry.versions.len(),
                entry.latest
            );
            staged.insert(key.clone(), entry);
            report.entries.push(key);
        }

        report.origins_synced.push(map.name);
        Ok(())
    }

    async fn sync_module(
        &self,
        base: &str,
        module: &str,
        report: &mut SyncReport,
    ) -> Result<ModuleMapEntry> {
        let info = self
            .fetch_json::<RemoteModuleInfo>(&info_url(base, module), report)
            .await?;

        let latest = self
            .fetch_text(&latest_url(base, module), report)
            .await?
            .map(|text| text.trim().to_string())
            .filter(|version| !version.is_empty());

        let mut versions = BTreeMap::new();
        if let Some(info) = &info {
            for version in &info.versions {
                let require = self
                    .fetch_json::<RequireSpec>(&require_url(base, module, version), report)
                    .await?;

                versions.insert(
                    version.clone(),
                    VersionRecord {
                        download: archive_url(base, module, version),
                        require,
                    },
                );
            }
        }

        let (author, description) = match info {
            Some(info) => (
                info.author,
                info.description
                    .map(|raw| resolve_description(base, module, &raw)),
            ),
            None => (None, None),
        };

        Ok(ModuleMapEntry {
            author,
            description,
            versions,
            latest,
        })
    }

    /// Fetch a document; unavailable becomes `None`, cancellation is fatal
    async fn fetch_text(&self, url: &str, report: &mut SyncReport) -> Result<Option<String>> {
        match self.source.fetch_text(url).await {
            Ok(text) => Ok(Some(text)),
            Err(e @ FetchError::Cancelled { .. }) => Err(e.into()),
            Err(e) => {
                warn!("{}", e);
                report.unavailable.push(url.to_string());
                Ok(None)
            }
        }
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        report: &mut SyncReport,
    ) -> Result<Option<T>> {
        let Some(text) = self.fetch_text(url, report).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&text) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!("Ignoring malformed document {}: {}", url, e);
                report.unavailable.push(url.to_string());
                Ok(None)
            }
        }
    }
}
