//! Extraction tracking: which archive produced which file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Archive the file came out of.
    pub archive: PathBuf,
    /// Path of the extracted file on disk.
    pub path: PathBuf,
}

/// Ordered list of extracted files. Nested archives that were expanded and
/// deleted are dropped from the list, so every entry exists on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionRecord {
    entries: Vec<ExtractedEntry>,
}

impl ExtractionRecord {
    pub fn push(&mut self, archive: &Path, path: &Path) {
        self.entries.push(ExtractedEntry {
            archive: archive.to_path_buf(),
            path: path.to_path_buf(),
        });
    }

    pub(crate) fn remove_path(&mut self, path: &Path) {
        self.entries.retain(|e| e.path != path);
    }

    pub fn entries(&self) -> &[ExtractedEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the record as a flat list, one extracted path per line.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut out = io::BufWriter::new(fs::File::create(path)?);
        for entry in &self.entries {
            writeln!(out, "{}", entry.path.display())?;
        }
        out.flush()
    }

    pub fn log(&self) {
        tracing::info!("extracted {} file(s)", self.entries.len());
        for entry in &self.entries {
            tracing::info!(
                "extracted {} (from {})",
                entry.path.display(),
                entry.archive.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_and_persist() {
        let mut record = ExtractionRecord::default();
        let archive = Path::new("/d/outer.zip");
        record.push(archive, Path::new("/d/a.txt"));
        record.push(archive, Path::new("/d/inner.zip"));
        record.push(Path::new("/d/inner.zip"), Path::new("/d/inner/b.txt"));
        record.remove_path(Path::new("/d/inner.zip"));
        assert_eq!(record.len(), 2);

        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("track.log");
        record.write_to(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "/d/a.txt\n/d/inner/b.txt\n");
    }
}
