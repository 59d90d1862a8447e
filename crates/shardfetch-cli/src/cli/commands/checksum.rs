//! Checksum command: verify a file's SHA-256.

use anyhow::{Context, Result};
use shardfetch_core::checksum::{self, ChecksumResult, ChecksumSource};
use shardfetch_core::config::Settings;
use std::path::Path;

/// Resolve the source given on the command line, applying `--raw_pointer`.
pub(super) fn source_from_arg(value: &str, raw_pointer: bool) -> ChecksumSource {
    match ChecksumSource::parse(value) {
        ChecksumSource::Url(url) if raw_pointer => {
            ChecksumSource::Url(checksum::raw_pointer_url(&url))
        }
        other => other,
    }
}

/// Verify `path` and fail on mismatch.
pub(super) fn verify_file(
    path: &Path,
    source: &ChecksumSource,
    settings: &Settings,
) -> Result<ChecksumResult> {
    let result = checksum::verify(path, source, settings.checksum_timeout)
        .with_context(|| format!("verify checksum of {}", path.display()))?;
    if !result.matched {
        anyhow::bail!(
            "checksum mismatch for {}: computed {}, expected {}",
            path.display(),
            result.computed,
            result.expected
        );
    }
    Ok(result)
}

/// Report lines for a comparison, printed whether or not it matched.
fn format_result(path: &Path, result: &ChecksumResult) -> String {
    format!(
        "file:     {}\ncomputed: {}\nexpected: {}\nmatched:  {}",
        path.display(),
        result.computed,
        result.expected,
        if result.matched { "yes" } else { "no" }
    )
}

/// Verify and print the result; a mismatch is printed, then fails the command.
pub fn run_checksum(
    path: &Path,
    source: &str,
    raw_pointer: bool,
    settings: &Settings,
) -> Result<()> {
    let source = source_from_arg(source, raw_pointer);
    let result = checksum::verify(path, &source, settings.checksum_timeout)
        .with_context(|| format!("verify checksum of {}", path.display()))?;
    println!("{}", format_result(path, &result));
    if !result.matched {
        anyhow::bail!("checksum mismatch for {}", path.display());
    }
    Ok(())
}
