//! Proxy Sorter - vmess/vless subscription relabeling
//!
//! Fetches subscription feeds, labels every vmess and vless proxy with the
//! country its server resolves to, and splits them into per-country lists.

pub mod proxy;

pub use proxy::*;

use std::path::PathBuf;
use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Default geolocation service base URL
pub const DEFAULT_GEO_API_URL: &str = "http://ip-api.com/json";

/// Default directory receiving the per-country files
pub const DEFAULT_OUTPUT_DIR: &str = "output";

const DEFAULT_GEO_TIMEOUT_SECS: u64 = 5;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONCURRENCY: usize = 10;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the HTTP geolocation service
    pub geo_api_url: String,
    /// Offline MMDB database used instead of the HTTP service when set
    pub mmdb_path: Option<PathBuf>,
    /// Directory the per-country files are written to
    pub output_dir: PathBuf,
    /// Timeout for a single geolocation lookup
    pub geo_timeout: Duration,
    /// Timeout for a single subscription fetch
    pub fetch_timeout: Duration,
    /// Maximum number of country lookups in flight for one subscription
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geo_api_url: DEFAULT_GEO_API_URL.to_string(),
            mmdb_path: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            geo_timeout: Duration::from_secs(DEFAULT_GEO_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geo_api_url(mut self, url: String) -> Self {
        self.geo_api_url = url;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_geo_timeout(mut self, timeout: Duration) -> Self {
        self.geo_timeout = timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Concurrency is clamped to at least one request
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
