//! Layered configuration: CLI flags over a config file over built-in defaults.
//!
//! Both the config file and the CLI produce a [`ConfigLayer`] where every field
//! is optional. Layers are merged once at startup and resolved into
//! [`Settings`], which is what the rest of the program reads.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 60.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
pub const DEFAULT_MAX_EXTRACT_DEPTH: usize = 8;
pub const DEFAULT_CHECKSUM_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_MONITOR_INTERVAL_SECS: f64 = 1.0;

/// One source of settings. `None` means "not set here, ask the next layer".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Body write size in bytes.
    pub chunk_size: Option<usize>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Seconds to wait between attempts.
    pub retry_delay: Option<f64>,
    /// Per-attempt request timeout in seconds.
    pub timeout: Option<f64>,
    pub stream_log: Option<bool>,
    pub file_log: Option<bool>,
    pub log_dir: Option<PathBuf>,
    pub debug_logging: Option<bool>,
    /// Extract the download when it is a ZIP archive.
    pub unzip: Option<bool>,
    pub track_extraction: Option<bool>,
    /// Deepest nested archive level that will be expanded.
    pub max_extract_depth: Option<usize>,
    /// Timeout in seconds for fetching a reference checksum.
    pub checksum_timeout: Option<f64>,
    /// Resource monitor sampling interval in seconds.
    pub monitor_interval: Option<f64>,
}

impl ConfigLayer {
    /// Field-wise merge: values set in `self` win over values in `lower`.
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            chunk_size: self.chunk_size.or(lower.chunk_size),
            max_retries: self.max_retries.or(lower.max_retries),
            retry_delay: self.retry_delay.or(lower.retry_delay),
            timeout: self.timeout.or(lower.timeout),
            stream_log: self.stream_log.or(lower.stream_log),
            file_log: self.file_log.or(lower.file_log),
            log_dir: self.log_dir.or(lower.log_dir),
            debug_logging: self.debug_logging.or(lower.debug_logging),
            unzip: self.unzip.or(lower.unzip),
            track_extraction: self.track_extraction.or(lower.track_extraction),
            max_extract_depth: self.max_extract_depth.or(lower.max_extract_depth),
            checksum_timeout: self.checksum_timeout.or(lower.checksum_timeout),
            monitor_interval: self.monitor_interval.or(lower.monitor_interval),
        }
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub stream_log: bool,
    pub file_log: bool,
    pub log_dir: PathBuf,
    pub debug_logging: bool,
    pub unzip: bool,
    pub track_extraction: bool,
    pub max_extract_depth: usize,
    pub checksum_timeout: Duration,
    pub monitor_interval: Duration,
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{} must be a non-negative number of seconds, got {}", name, value))
}

fn positive_seconds(name: &str, value: f64) -> Result<Duration> {
    let d = seconds(name, value)?;
    if d.is_zero() {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(d)
}

impl Settings {
    /// Resolve a merged layer against built-in defaults and validate it.
    pub fn resolve(layer: ConfigLayer) -> Result<Settings> {
        let chunk_size = layer.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        Ok(Settings {
            chunk_size,
            max_retries: layer.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: seconds(
                "retry_delay",
                layer.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            )?,
            timeout: positive_seconds("timeout", layer.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))?,
            stream_log: layer.stream_log.unwrap_or(true),
            file_log: layer.file_log.unwrap_or(false),
            log_dir: layer.log_dir.unwrap_or_else(logging::default_log_dir),
            debug_logging: layer.debug_logging.unwrap_or(false),
            unzip: layer.unzip.unwrap_or(false),
            track_extraction: layer.track_extraction.unwrap_or(false),
            max_extract_depth: layer.max_extract_depth.unwrap_or(DEFAULT_MAX_EXTRACT_DEPTH),
            checksum_timeout: positive_seconds(
                "checksum_timeout",
                layer
                    .checksum_timeout
                    .unwrap_or(DEFAULT_CHECKSUM_TIMEOUT_SECS),
            )?,
            monitor_interval: positive_seconds(
                "monitor_interval",
                layer
                    .monitor_interval
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECS),
            )?,
        })
    }
}

/// Parse a config file. `.toml` files are read as TOML, everything else as YAML.
pub fn parse_file(path: &Path, data: &str) -> Result<ConfigLayer> {
    if data.trim().is_empty() {
        return Ok(ConfigLayer::default());
    }
    let is_toml = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let layer = if is_toml {
        toml::from_str(data).with_context(|| format!("parse TOML config {}", path.display()))?
    } else {
        serde_yaml::from_str(data)
            .with_context(|| format!("parse YAML config {}", path.display()))?
    };
    Ok(layer)
}

/// `$XDG_CONFIG_HOME/shardfetch/config.yaml` (or `config.yml` / `config.toml`) if one exists.
pub fn default_config_path() -> Option<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("shardfetch").ok()?;
    ["config.yaml", "config.yml", "config.toml"]
        .iter()
        .find_map(|name| xdg_dirs.find_config_file(name))
}

/// Load the config layer from `explicit` (which must exist), else from the
/// default location if present, else an empty layer.
pub fn load(explicit: Option<&Path>) -> Result<ConfigLayer> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(ConfigLayer::default()),
        },
    };
    let data = fs::read_to_string(&path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let layer = parse_file(&path, &data)?;
    tracing::debug!("loaded config from {}: {:?}", path.display(), layer);
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let s = Settings::resolve(ConfigLayer::default()).unwrap();
        assert_eq!(s.chunk_size, 8192);
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.retry_delay, Duration::from_secs(60));
        assert_eq!(s.timeout, Duration::from_secs(60));
        assert!(s.stream_log);
        assert!(!s.file_log);
        assert!(!s.unzip);
        assert!(!s.track_extraction);
        assert_eq!(s.max_extract_depth, 8);
    }

    #[test]
    fn yaml_file_values() {
        let yaml = r#"
max_retries: 3
retry_delay: 0.5
timeout: 30
unzip: true
log_dir: /var/log/shards
"#;
        let layer = parse_file(Path::new("config.yaml"), yaml).unwrap();
        assert_eq!(layer.max_retries, Some(3));
        assert_eq!(layer.retry_delay, Some(0.5));
        assert_eq!(layer.unzip, Some(true));
        assert!(layer.chunk_size.is_none());
        let s = Settings::resolve(layer).unwrap();
        assert_eq!(s.retry_delay, Duration::from_millis(500));
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.log_dir, PathBuf::from("/var/log/shards"));
    }

    #[test]
    fn toml_file_values() {
        let toml = r#"
            chunk_size = 65536
            track_extraction = true
        "#;
        let layer = parse_file(Path::new("shardfetch.toml"), toml).unwrap();
        assert_eq!(layer.chunk_size, Some(65536));
        assert_eq!(layer.track_extraction, Some(true));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_file(Path::new("c.yaml"), "max_retires: 3\n").is_err());
    }

    #[test]
    fn empty_file_is_empty_layer() {
        let layer = parse_file(Path::new("c.yaml"), "\n").unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn precedence_cli_over_file_over_default() {
        let file = ConfigLayer {
            max_retries: Some(3),
            retry_delay: Some(10.0),
            chunk_size: Some(1024),
            ..Default::default()
        };
        let cli = ConfigLayer {
            max_retries: Some(7),
            ..Default::default()
        };
        let s = Settings::resolve(cli.over(file)).unwrap();
        assert_eq!(s.max_retries, 7);
        assert_eq!(s.retry_delay, Duration::from_secs(10));
        assert_eq!(s.chunk_size, 1024);
        assert_eq!(s.timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_chunk = ConfigLayer {
            chunk_size: Some(0),
            ..Default::default()
        };
        assert!(Settings::resolve(zero_chunk).is_err());

        let negative_delay = ConfigLayer {
            retry_delay: Some(-1.0),
            ..Default::default()
        };
        assert!(Settings::resolve(negative_delay).is_err());

        let zero_timeout = ConfigLayer {
            timeout: Some(0.0),
            ..Default::default()
        };
        assert!(Settings::resolve(zero_timeout).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(Some(&tmp.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(&path, "file_log: true\nmax_extract_depth: 2\n").unwrap();
        let layer = load(Some(&path)).unwrap();
        assert_eq!(layer.file_log, Some(true));
        assert_eq!(layer.max_extract_depth, Some(2));
    }
}
