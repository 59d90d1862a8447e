//! ZIP extraction with recursive expansion of nested archives.
//!
//! Every extracted `.zip` file whose content is a ZIP archive is expanded into
//! a sibling directory named after it and then deleted. Other ZIP-container
//! formats (`.npz`, `.jar`, ...) are left as they are. The top-level archive is
//! never deleted. Recursion is bounded by `max_depth`, and an archive that
//! (transitively) contains itself is rejected.

mod nested;
mod record;

pub use record::{ExtractedEntry, ExtractionRecord};

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::checksum;
use crate::fs_utils::{self, FsError};
use nested::AncestorChain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Record every extracted file.
    pub track: bool,
    /// Deepest nesting level that is expanded; the top-level archive is level 0.
    pub max_depth: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            track: false,
            max_depth: crate::config::DEFAULT_MAX_EXTRACT_DEPTH,
        }
    }
}

/// Why extraction of an archive stopped.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error("failed to write entry {entry:?}: {source}")]
    Entry {
        entry: String,
        #[source]
        source: io::Error,
    },
    #[error("entry {entry:?} escapes the destination directory")]
    PathTraversal { entry: String },
    #[error("nested archive exceeds maximum depth {max_depth}")]
    DepthExceeded { max_depth: usize },
    #[error("archive contains itself (sha256 {digest})")]
    Cycle { digest: String },
    #[error("could not hash nested archive: {0}")]
    Hash(#[source] checksum::ChecksumError),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("corrupt archive {}: {source}", path.display())]
    ArchiveCorrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("extraction of {} failed: {cause}", archive.display())]
    ExtractionFailure {
        archive: PathBuf,
        #[source]
        cause: FailureCause,
    },
    #[error(transparent)]
    Directory(#[from] FsError),
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract `archive` into `destination`, expanding nested archives.
///
/// Returns the record of extracted files (empty unless `options.track`).
/// On failure, files already extracted stay on disk.
pub fn extract_archive(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionRecord, ExtractError> {
    let mut run = Extraction::new(archive, options);
    tracing::info!(
        "unzipping {} into {} (max depth {})",
        archive.display(),
        destination.display(),
        options.max_depth
    );
    if let Err(e) = run.extract(archive, destination, 0) {
        tracing::error!("unzipping {} failed: {}", archive.display(), e);
        return Err(e);
    }
    tracing::info!(
        "unzipping {} into {} completed",
        archive.display(),
        destination.display()
    );
    if options.track {
        run.record.log();
    }
    Ok(run.record)
}

struct Extraction {
    options: ExtractOptions,
    root: PathBuf,
    ancestors: AncestorChain,
    record: ExtractionRecord,
}

impl Extraction {
    fn new(root: &Path, options: &ExtractOptions) -> Self {
        Self {
            options: *options,
            root: root.to_path_buf(),
            ancestors: AncestorChain::default(),
            record: ExtractionRecord::default(),
        }
    }

    fn failure(archive: &Path, cause: FailureCause) -> ExtractError {
        ExtractError::ExtractionFailure {
            archive: archive.to_path_buf(),
            cause,
        }
    }

    fn extract(&mut self, archive: &Path, destination: &Path, depth: usize) -> Result<(), ExtractError> {
        tracing::debug!(
            "extracting {} (depth {} of {})",
            archive.display(),
            depth,
            self.options.max_depth
        );
        let extracted = self.unpack(archive, destination)?;

        for path in extracted {
            let nested = nested::is_nested_archive(&path).map_err(|source| {
                ExtractError::Filesystem {
                    path: path.clone(),
                    source,
                }
            })?;
            if !nested {
                continue;
            }
            if depth + 1 > self.options.max_depth {
                return Err(Self::failure(
                    &path,
                    FailureCause::DepthExceeded {
                        max_depth: self.options.max_depth,
                    },
                ));
            }
            if self.ancestors.is_empty() {
                // The root is only hashed once it turns out to contain archives.
                let root = self.root.clone();
                self.enter(&root)?;
            }
            self.enter(&path)?;
            let nested_dest = nested::nested_dir(&path);
            let result = self.extract(&path, &nested_dest, depth + 1);
            self.ancestors.leave();
            result?;

            fs::remove_file(&path).map_err(|source| ExtractError::Filesystem {
                path: path.clone(),
                source,
            })?;
            self.record.remove_path(&path);
            tracing::debug!("removed nested archive {}", path.display());
        }
        Ok(())
    }

    fn enter(&mut self, archive: &Path) -> Result<(), ExtractError> {
        let digest = checksum::sha256_path(archive)
            .map_err(|e| Self::failure(archive, FailureCause::Hash(e)))?;
        if !self.ancestors.enter(digest.clone()) {
            return Err(Self::failure(archive, FailureCause::Cycle { digest }));
        }
        Ok(())
    }

    /// Write every entry of `archive` under `destination`; returns the files written.
    fn unpack(&mut self, archive: &Path, destination: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let file = File::open(archive).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ExtractError::NotFound(archive.to_path_buf())
            } else {
                ExtractError::Filesystem {
                    path: archive.to_path_buf(),
                    source,
                }
            }
        })?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|source| {
            ExtractError::ArchiveCorrupt {
                path: archive.to_path_buf(),
                source,
            }
        })?;
        let destination = fs_utils::ensure_dir(destination, true)?;
        tracing::debug!("{} holds {} entries", archive.display(), zip.len());

        let mut extracted = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|source| ExtractError::ArchiveCorrupt {
                path: archive.to_path_buf(),
                source,
            })?;
            let name = entry.name().to_string();
            let relative = match entry.enclosed_name() {
                Some(p) => p.to_path_buf(),
                None => {
                    return Err(Self::failure(
                        archive,
                        FailureCause::PathTraversal { entry: name },
                    ))
                }
            };
            let out_path = destination.join(relative);
            let entry_err = |source: io::Error| {
                Self::failure(
                    archive,
                    FailureCause::Entry {
                        entry: name.clone(),
                        source,
                    },
                )
            };

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(entry_err)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(entry_err)?;
            }
            let mut out = File::create(&out_path).map_err(entry_err)?;
            io::copy(&mut entry, &mut out).map_err(entry_err)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    // Keep only permission bits; never drop our own write access.
                    let mode = (mode & 0o777) | 0o200;
                    fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                        .map_err(entry_err)?;
                }
            }

            tracing::trace!("extracted {}", out_path.display());
            if self.options.track {
                self.record.push(archive, &out_path);
            }
            extracted.push(out_path);
        }

        tracing::info!(
            "extracted {} file(s) from {} into {}",
            extracted.len(),
            archive.display(),
            destination.display()
        );
        Ok(extracted)
    }
}
