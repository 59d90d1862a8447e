//! Ensure-dir command: create the directory a path needs.

use anyhow::Result;
use shardfetch_core::fs_utils;
use std::path::Path;

/// Create the directory for `path` and print it.
pub fn run_ensure_dir(path: &Path, is_directory: bool) -> Result<()> {
    let dir = fs_utils::ensure_dir(path, is_directory)?;
    println!("{}", dir.display());
    Ok(())
}
