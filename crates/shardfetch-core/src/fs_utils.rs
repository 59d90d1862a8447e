//! Directory creation for download destinations, extraction targets and log files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to create directory {}: {source}", path.display())]
pub struct FsError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Resolve `path` against the current directory without touching the filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf, FsError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| FsError {
            path: path.to_path_buf(),
            source,
        })
}

/// Ensure the directory for `path` exists and return it.
///
/// When `is_directory` is true, `path` itself names the directory; otherwise
/// `path` is a file and its parent directory is created.
pub fn ensure_dir(path: &Path, is_directory: bool) -> Result<PathBuf, FsError> {
    let absolute = absolute(path)?;
    let directory = if is_directory {
        absolute.clone()
    } else {
        match absolute.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(absolute),
        }
    };

    if directory.is_dir() {
        tracing::debug!("directory already exists: {}", directory.display());
        return Ok(directory);
    }

    tracing::debug!("creating directory: {}", directory.display());
    fs::create_dir_all(&directory).map_err(|source| {
        tracing::error!(
            "failed to create directory {} for {}: {}",
            directory.display(),
            absolute.display(),
            source
        );
        FsError {
            path: directory.clone(),
            source,
        }
    })?;
    tracing::debug!("created directory: {}", directory.display());
    Ok(directory)
}
