use std::path::{Path, PathBuf};

use semver::Prerelease;
use serde::Deserialize;
use thiserror::Error;

use crate::version::registries::npm::DEFAULT_BASE_URL;

// =============================================================================
// Defaults
// =============================================================================

/// Maximum number of registry requests in flight at once
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Retries after the first attempt for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry in milliseconds; doubles on every further retry
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1000;

/// Lifetime of a cached resolution in milliseconds (5 minutes)
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

/// Interval between background sweeps of expired cache entries (60 seconds)
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Minimum spacing between "refresh display" notifications per scope (200ms)
pub const DEFAULT_REFRESH_DEBOUNCE_MS: u64 = 200;

/// Pipeline configuration supplied by the host
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Gate for the whole pipeline
    pub enabled: bool,
    pub prerelease: PrereleasePolicy,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub refresh_debounce_ms: u64,
    pub registry: RegistryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prerelease: PrereleasePolicy::default(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            refresh_debounce_ms: DEFAULT_REFRESH_DEBOUNCE_MS,
            registry: RegistryConfig::default(),
        }
    }
}

/// Which pre-release channels may be suggested as upgrades
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PrereleasePolicy {
    pub allow_release_candidate: bool,
    pub allow_beta: bool,
    pub allow_alpha: bool,
    pub allow_dev: bool,
}

impl PrereleasePolicy {
    /// Markers that identify a recognised pre-release channel
    pub const CHANNEL_MARKERS: [&'static str; 4] = ["rc", "beta", "alpha", "dev"];

    pub fn allow_all() -> Self {
        Self {
            allow_release_candidate: true,
            allow_beta: true,
            allow_alpha: true,
            allow_dev: true,
        }
    }

    fn channels(&self) -> [(&'static str, bool); 4] {
        [
            ("rc", self.allow_release_candidate),
            ("beta", self.allow_beta),
            ("alpha", self.allow_alpha),
            ("dev", self.allow_dev),
        ]
    }

    /// False when `version` mentions a channel this policy does not allow
    pub fn allows(&self, version: &str) -> bool {
        self.channels()
            .iter()
            .all(|(marker, allowed)| *allowed || !version.contains(marker))
    }

    /// True when a pre-release suffix belongs to one of the known channels
    pub fn is_known_channel(pre: &Prerelease) -> bool {
        Self::CHANNEL_MARKERS
            .iter()
            .any(|marker| pre.as_str().contains(marker))
    }
}

/// Request queue tuning
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_ms: DEFAULT_BASE_RETRY_DELAY_MS,
        }
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
    /// Background sweep interval in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

/// Registry endpoint configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load configuration from a JSON file, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the path to the data directory for version-lens.
/// Uses $XDG_DATA_HOME/version-lens if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/version-lens,
/// or ./version-lens if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the directory log files are written to.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("version-lens")
}
