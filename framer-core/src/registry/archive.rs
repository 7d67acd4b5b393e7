//! Release archive writer
//!
//! Zips a module directory for publishing. Hidden entries and build or cache
//! directories are left out. Entries are stored in sorted order with a fixed
//! timestamp so an unchanged module always produces the same bytes.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Directory names never stored in a release archive
pub const EXCLUDED_DIRS: &[&str] = &["__pycache__", "target", "node_modules"];

/// What was written to an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Stored entry names, relative to the module root with `/` separators
    pub entries: Vec<String>,
}

fn is_excluded(entry: &DirEntry, extra_excluded: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    let name: &str = &file_name;
    if name.starts_with('.') {
        return true;
    }

    entry.file_type().is_dir()
        && (EXCLUDED_DIRS.contains(&name) || extra_excluded.iter().any(|d| d == name))
}

/// Zip `module_dir` into `dest`
///
/// `extra_excluded` adds directory names to [`EXCLUDED_DIRS`].
pub fn build_archive(
    module_dir: &Path,
    dest: &Path,
    extra_excluded: &[String],
) -> Result<ArchiveSummary> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut summary = ArchiveSummary::default();
    let walker = WalkDir::new(module_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e, extra_excluded));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", module_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(module_dir)
            .with_context(|| format!("{} is outside the module", entry.path().display()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;

        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {name} to archive"))?;
        zip.write_all(&content)
            .with_context(|| format!("Failed to write {name} to archive"))?;

        debug!("Archived {}", name);
        summary.entries.push(name);
    }

    zip.finish()
        .with_context(|| format!("Failed to finalize {}", dest.display()))?;

    Ok(summary)
}
