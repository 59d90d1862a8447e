//! Logging setup: console and/or timestamped log file.
//!
//! Builds an explicit `tracing::Dispatch` rather than touching global state,
//! so tests can scope a logger with `tracing::dispatcher::with_default`.
//! The CLI installs the dispatch once with [`Logger::install`].

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::fs_utils;

/// Where log output goes and how verbose it is.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log to stderr.
    pub stream: bool,
    /// Log to `<log_dir>/<name>-<timestamp>.log`.
    pub file: bool,
    pub log_dir: PathBuf,
    /// Log file prefix, usually the destination file name.
    pub name: String,
    /// Default to `debug` instead of `info` when `RUST_LOG` is unset.
    pub debug: bool,
}

/// A constructed, not yet installed, logger.
pub struct Logger {
    dispatch: Dispatch,
    log_file: Option<PathBuf>,
}

impl Logger {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Path of the log file, when file logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Make this logger the process-wide default. Fails if one is already set.
    pub fn install(self) -> Result<Option<PathBuf>> {
        tracing::dispatcher::set_global_default(self.dispatch)
            .context("a global logger is already installed")?;
        if let Some(path) = &self.log_file {
            tracing::info!("logging to {}", path.display());
        }
        Ok(self.log_file)
    }
}

/// Writer that is either a file or stderr (used when file clone fails).
enum FileOrStderr {
    File(fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct FileMakeWriter(fs::File);

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileOrStderr;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(FileOrStderr::File)
            .unwrap_or(FileOrStderr::Stderr)
    }
}

/// Local timestamp used in log and tracking file names (no `:` so it is a valid file name everywhere).
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Default log directory: `$XDG_STATE_HOME/shardfetch`, or `./logs` when XDG is unavailable.
pub fn default_log_dir() -> PathBuf {
    match xdg::BaseDirectories::with_prefix("shardfetch") {
        Ok(dirs) => dirs.get_state_home(),
        Err(_) => PathBuf::from("logs"),
    }
}

fn file_stem_for(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() {
        "shardfetch".to_string()
    } else {
        base
    }
}

/// Build a logger from `opts`. At least one of stream or file output must be enabled.
pub fn build(opts: &LogOptions) -> Result<Logger> {
    if !opts.stream && !opts.file {
        anyhow::bail!("logger setup needs at least one of stream logging and file logging");
    }

    let default_level = if opts.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stream_layer = opts.stream.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    let (file_layer, log_file) = if opts.file {
        fs_utils::ensure_dir(&opts.log_dir, true)?;
        let path = opts
            .log_dir
            .join(format!("{}-{}.log", file_stem_for(&opts.name), timestamp()));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(BoxMakeWriter::new(FileMakeWriter(file)))
            .with_ansi(false);
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stream_layer)
        .with(file_layer);

    Ok(Logger {
        dispatch: Dispatch::new(subscriber),
        log_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(dir: &Path, stream: bool, file: bool) -> LogOptions {
        LogOptions {
            stream,
            file,
            log_dir: dir.to_path_buf(),
            name: "data/shard-00.zip".to_string(),
            debug: false,
        }
    }

    #[test]
    fn neither_sink_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(build(&opts(tmp.path(), false, false)).is_err());
    }

    #[test]
    fn stream_only_has_no_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = build(&opts(tmp.path(), true, false)).unwrap();
        assert!(logger.log_file().is_none());
    }

    #[test]
    fn file_sink_receives_events() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");
        let logger = build(&opts(&log_dir, false, true)).unwrap();
        let path = logger.log_file().unwrap().to_path_buf();
        assert!(path.starts_with(&log_dir));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("shard-00.zip-"), "{}", name);
        assert!(name.ends_with(".log"));

        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::warn!("marker event for the file sink");
        });
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("marker event for the file sink"));
        assert!(content.contains("WARN"));
    }

    #[test]
    fn file_stem_strips_directories() {
        assert_eq!(file_stem_for("a/b/c.zip"), "c.zip");
        assert_eq!(file_stem_for(""), "shardfetch");
    }
}
