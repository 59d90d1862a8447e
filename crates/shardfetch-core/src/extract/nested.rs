//! Nested archive detection and the ancestor chain used for cycle detection.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Local file header and end-of-central-directory (empty archive) signatures.
const ZIP_MAGICS: [[u8; 4]; 2] = [*b"PK\x03\x04", *b"PK\x05\x06"];

/// True when `path` has a `.zip` extension (any case).
///
/// ZIP-container payloads such as `.npz`, `.jar` or `.docx` are data, not
/// archives to expand.
pub(crate) fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// True when `path` is a `.zip` file holding a readable ZIP archive.
pub(crate) fn is_nested_archive(path: &Path) -> io::Result<bool> {
    if !has_zip_extension(path) {
        return Ok(false);
    }
    is_zip(path)
}

/// True when `path` holds a readable ZIP archive, judged by content.
pub(crate) fn is_zip(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e),
    }
    if !ZIP_MAGICS.contains(&magic) {
        return Ok(false);
    }
    let file = File::open(path)?;
    Ok(zip::ZipArchive::new(BufReader::new(file)).is_ok())
}

/// Directory a nested archive expands into: a sibling named after its stem
/// (`dir/inner.zip` -> `dir/inner`).
///
/// When that name is taken by something other than a directory (or is the
/// archive itself), `<stem>_extracted`, then `<stem>_extracted_2`, ... are tried.
pub(crate) fn nested_dir(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "nested".into());
    let mut n = 0u32;
    loop {
        let mut name: OsString = stem.clone();
        match n {
            0 => {}
            1 => name.push("_extracted"),
            _ => name.push(format!("_extracted_{}", n)),
        }
        let dir = archive.with_file_name(&name);
        let usable = match fs::symlink_metadata(&dir) {
            Ok(meta) => meta.is_dir(),
            Err(_) => true,
        };
        if dir != archive && usable {
            return dir;
        }
        n += 1;
    }
}

/// Content digests of the archives currently being expanded, outermost first.
#[derive(Debug, Default)]
pub(crate) struct AncestorChain {
    digests: Vec<String>,
}

impl AncestorChain {
    /// Push `digest`; returns false (and leaves the chain unchanged) when it is
    /// already an ancestor, i.e. the archive contains itself.
    pub fn enter(&mut self, digest: String) -> bool {
        if self.digests.contains(&digest) {
            return false;
        }
        self.digests.push(digest);
        true
    }

    pub fn leave(&mut self) {
        self.digests.pop();
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nested_dir_naming() {
        assert_eq!(nested_dir(Path::new("/x/inner.zip")), PathBuf::from("/x/inner"));
        assert_eq!(nested_dir(Path::new("/x/a.b.zip")), PathBuf::from("/x/a.b"));
        assert_eq!(
            nested_dir(Path::new("/x/blob")),
            PathBuf::from("/x/blob_extracted")
        );
    }

    #[test]
    fn nested_dir_avoids_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("data.zip");
        assert_eq!(nested_dir(&archive), tmp.path().join("data"));

        fs::write(tmp.path().join("data"), b"plain file").unwrap();
        assert_eq!(nested_dir(&archive), tmp.path().join("data_extracted"));

        fs::write(tmp.path().join("data_extracted"), b"also taken").unwrap();
        assert_eq!(nested_dir(&archive), tmp.path().join("data_extracted_2"));
    }

    #[test]
    fn existing_directory_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("data")).unwrap();
        assert_eq!(
            nested_dir(&tmp.path().join("data.zip")),
            tmp.path().join("data")
        );
    }

    #[test]
    fn only_zip_extension_is_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let bytes = {
            let mut w = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
            w.start_file("arr_0.npy", zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut w, b"array").unwrap();
            w.finish().unwrap().into_inner()
        };
        for (name, nested) in [
            ("inner.zip", true),
            ("INNER.ZIP", true),
            ("points.npz", false),
            ("lib.jar", false),
            ("report.docx", false),
        ] {
            let path = tmp.path().join(name);
            fs::write(&path, &bytes).unwrap();
            assert!(is_zip(&path).unwrap(), "{}", name);
            assert_eq!(is_nested_archive(&path).unwrap(), nested, "{}", name);
        }
    }

    #[test]
    fn ancestor_chain_detects_cycles_only_on_the_path() {
        let mut chain = AncestorChain::default();
        assert!(chain.enter("a".into()));
        assert!(chain.enter("b".into()));
        assert!(!chain.enter("a".into()));
        chain.leave();
        // A sibling with the same content as a finished sibling is not a cycle.
        assert!(chain.enter("b".into()));
        chain.leave();
        chain.leave();
        assert!(chain.is_empty());
    }

    #[test]
    fn non_zip_content_is_not_an_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let text = tmp.path().join("fake.zip");
        fs::write(&text, b"just text").unwrap();
        assert!(!is_zip(&text).unwrap());

        let short = tmp.path().join("short.zip");
        fs::write(&short, b"PK").unwrap();
        assert!(!is_zip(&short).unwrap());

        let truncated = tmp.path().join("truncated.zip");
        fs::write(&truncated, b"PK\x03\x04garbage").unwrap();
        assert!(!is_zip(&truncated).unwrap());
    }
}
