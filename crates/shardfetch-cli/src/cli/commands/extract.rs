//! `shardfetch extract`, plus the extraction step shared with `download`.

use anyhow::{Context, Result};
use shardfetch_core::config::Settings;
use shardfetch_core::extract::{self, ExtractOptions};
use shardfetch_core::{fs_utils, logging};
use std::path::{Path, PathBuf};

/// Tracking log for `archive`: `<log_dir>/<archive-stem>-extraction-<timestamp>.log`.
fn tracking_log_path(log_dir: &Path, archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    log_dir.join(format!("{}-extraction-{}.log", stem, logging::timestamp()))
}

/// Extract `archive` into `destination` with the resolved settings, persisting
/// the extraction record when tracking is on.
pub(super) fn extract_with_settings(
    archive: &Path,
    destination: &Path,
    settings: &Settings,
) -> Result<()> {
    let options = ExtractOptions {
        track: settings.track_extraction,
        max_depth: settings.max_extract_depth,
    };
    let record = extract::extract_archive(archive, destination, &options)
        .with_context(|| format!("extract {}", archive.display()))?;

    if settings.track_extraction {
        fs_utils::ensure_dir(&settings.log_dir, true)?;
        let path = tracking_log_path(&settings.log_dir, archive);
        record
            .write_to(&path)
            .with_context(|| format!("write extraction record {}", path.display()))?;
        tracing::info!(
            "extraction record ({} file(s)) written to {}",
            record.len(),
            path.display()
        );
    }
    Ok(())
}

pub fn run_extract(archive: &Path, destination: &Path, settings: &Settings) -> Result<()> {
    extract_with_settings(archive, destination, settings)?;
    println!("extracted {} into {}", archive.display(), destination.display());
    Ok(())
}
