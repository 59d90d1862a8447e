//! `shardfetch download`: ensure directory, download with retry, verify, extract.

use anyhow::{Context, Result};
use shardfetch_core::config::Settings;
use shardfetch_core::downloader::{self, DownloadRequest};
use shardfetch_core::fs_utils;
use std::path::{Path, PathBuf};

use super::checksum::{source_from_arg, verify_file};
use super::extract::extract_with_settings;
use crate::cli::DownloadArgs;

/// Where `--unzip` extracts to: `--extract_to`, else the destination's directory.
fn extraction_dir(args: &DownloadArgs) -> PathBuf {
    match &args.extract_to {
        Some(dir) => dir.clone(),
        None => args
            .destination_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

pub fn run_download(args: &DownloadArgs, settings: &Settings) -> Result<()> {
    fs_utils::ensure_dir(&args.destination_path, false)?;

    let request = DownloadRequest::from_settings(&args.url, &args.destination_path, settings);
    let report = match downloader::download(&request) {
        Ok(report) => report,
        Err(e) => {
            if let Err(rm) = downloader::discard_partial(&request.destination) {
                tracing::warn!(
                    "could not remove partial file {}: {}",
                    request.destination.display(),
                    rm
                );
            }
            return Err(e).with_context(|| format!("download {}", args.url));
        }
    };

    if let Some(source) = &args.checksum {
        let source = source_from_arg(source, args.raw_pointer);
        verify_file(&request.destination, &source, settings)?;
    }

    if settings.unzip {
        extract_with_settings(&request.destination, &extraction_dir(args), settings)?;
    }

    println!(
        "downloaded {} ({} bytes, {} attempt(s))",
        request.destination.display(),
        report.bytes,
        report.attempts
    );
    Ok(())
}
