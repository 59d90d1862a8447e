//! CLI for the shardfetch shard downloader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use shardfetch_core::config::{self, ConfigLayer, Settings};
use shardfetch_core::logging::{self, LogOptions};
use std::path::{Path, PathBuf};

use commands::{
    run_checksum, run_completions, run_download, run_ensure_dir, run_extract, run_man,
    run_monitor,
};

/// Top-level CLI for shardfetch.
#[derive(Debug, Parser)]
#[command(name = "shardfetch")]
#[command(about = "shardfetch: download, verify and unpack dataset shards", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options accepted by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Config file (YAML, or TOML with a .toml extension).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for log and extraction tracking files.
    #[arg(long = "log_dir", global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long = "debug_logging", global = true, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub debug_logging: Option<bool>,

    /// Log to stderr.
    #[arg(long = "stream_log", global = true, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub stream_log: Option<bool>,

    /// Log to a timestamped file under the log directory.
    #[arg(long = "file_log", global = true, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub file_log: Option<bool>,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Direct HTTP/HTTPS URL of the shard.
    pub url: String,

    /// File to write the shard to. Its parent directory is created if needed.
    pub destination_path: PathBuf,

    /// Extract the download when it is a ZIP archive.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub unzip: Option<bool>,

    /// Record every extracted file and write the list to the log directory.
    #[arg(long = "track_extraction", num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub track_extraction: Option<bool>,

    /// Bytes per write to the destination file.
    #[arg(long = "chunk_size", value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Retries after the first attempt.
    #[arg(long = "max_retries", value_name = "N")]
    pub max_retries: Option<u32>,

    /// Seconds to wait between attempts.
    #[arg(long = "retry_delay", value_name = "SECS")]
    pub retry_delay: Option<f64>,

    /// Seconds allowed to connect, or to stall below 1 KiB/s, per attempt.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Expected SHA-256: a hex digest or a URL serving one.
    #[arg(long, value_name = "URL_OR_HEX")]
    pub checksum: Option<String>,

    /// Treat --checksum as a download URL and read the git-lfs pointer next to it.
    #[arg(long = "raw_pointer")]
    pub raw_pointer: bool,

    /// Extraction directory (default: the destination's directory).
    #[arg(long = "extract_to", value_name = "DIR")]
    pub extract_to: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a shard with retry, then optionally verify and extract it.
    Download(DownloadArgs),

    /// Verify a file's SHA-256 against a digest or reference URL.
    Checksum {
        /// File to hash.
        file_path: PathBuf,
        /// Hex digest, or URL of a digest / git-lfs pointer file.
        checksum_source: String,
        /// Rewrite a .../resolve/... URL to its .../raw/... pointer file.
        #[arg(long = "raw_pointer")]
        raw_pointer: bool,
    },

    /// Extract a ZIP archive, expanding nested archives.
    Extract {
        archive_path: PathBuf,
        destination_path: PathBuf,
        /// Record every extracted file and write the list to the log directory.
        #[arg(long = "track_extraction", num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
        track_extraction: Option<bool>,
        /// Deepest nested archive level to expand.
        #[arg(long = "max_depth", value_name = "N")]
        max_depth: Option<usize>,
    },

    /// Create the directory for a path (its parent, unless --is_directory).
    EnsureDir {
        path: PathBuf,
        /// The path names a directory rather than a file.
        #[arg(long = "is_directory")]
        is_directory: bool,
    },

    /// Log CPU and memory usage periodically.
    Monitor {
        /// Seconds between samples.
        #[arg(long, value_name = "SECS")]
        interval: Option<f64>,
        /// Stop after N samples (default: run until interrupted).
        #[arg(long, value_name = "N")]
        samples: Option<u64>,
    },

    /// Print a shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff).
    Man,
}

impl Cli {
    /// Settings given on the command line; unset fields fall through to the config file.
    pub fn config_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            log_dir: self.global.log_dir.clone(),
            debug_logging: self.global.debug_logging,
            stream_log: self.global.stream_log,
            file_log: self.global.file_log,
            ..ConfigLayer::default()
        };
        match &self.command {
            CliCommand::Download(args) => {
                layer.unzip = args.unzip;
                layer.track_extraction = args.track_extraction;
                layer.chunk_size = args.chunk_size;
                layer.max_retries = args.max_retries;
                layer.retry_delay = args.retry_delay;
                layer.timeout = args.timeout;
            }
            CliCommand::Extract {
                track_extraction,
                max_depth,
                ..
            } => {
                layer.track_extraction = *track_extraction;
                layer.max_extract_depth = *max_depth;
            }
            CliCommand::Monitor { interval, .. } => layer.monitor_interval = *interval,
            _ => {}
        }
        layer
    }

    /// Prefix for the log file name: the file the command is about.
    fn log_name(&self) -> String {
        let path: Option<&Path> = match &self.command {
            CliCommand::Download(args) => Some(args.destination_path.as_path()),
            CliCommand::Checksum { file_path, .. } => Some(file_path.as_path()),
            CliCommand::Extract { archive_path, .. } => Some(archive_path.as_path()),
            _ => None,
        };
        path.and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shardfetch".to_string())
    }

    pub fn run(self) -> Result<()> {
        // Output-only commands skip config and logging.
        match &self.command {
            CliCommand::Completions { shell } => return run_completions(*shell),
            CliCommand::Man => return run_man(),
            _ => {}
        }

        let file_layer = config::load(self.global.config.as_deref())?;
        let settings = Settings::resolve(self.config_layer().over(file_layer))?;

        let logger = logging::build(&LogOptions {
            stream: settings.stream_log,
            file: settings.file_log,
            log_dir: settings.log_dir.clone(),
            name: self.log_name(),
            debug: settings.debug_logging,
        })?;
        logger.install()?;
        tracing::debug!("resolved settings: {:?}", settings);

        match self.command {
            CliCommand::Download(args) => run_download(&args, &settings)?,
            CliCommand::Checksum {
                file_path,
                checksum_source,
                raw_pointer,
            } => run_checksum(&file_path, &checksum_source, raw_pointer, &settings)?,
            CliCommand::Extract {
                archive_path,
                destination_path,
                ..
            } => run_extract(&archive_path, &destination_path, &settings)?,
            CliCommand::EnsureDir { path, is_directory } => run_ensure_dir(&path, is_directory)?,
            CliCommand::Monitor { samples, .. } => run_monitor(&settings, samples)?,
            CliCommand::Completions { .. } | CliCommand::Man => {}
        }

        Ok(())
    }
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        Cli::parse().run()
    }
}

#[cfg(test)]
mod tests;
