//! Subscription fetching
//!
//! This module provides:
//! - The `SubscriptionFetcher` capability used by the aggregator
//! - An HTTP implementation with a per-request timeout
//! - Helpers for reading subscription source lists

use crate::proxy::error::ProxyError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default timeout for subscription requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default user agent for subscription requests
const DEFAULT_USER_AGENT: &str = concat!("proxy-sorter/", env!("CARGO_PKG_VERSION"));

/// Source of raw subscription text
#[async_trait]
pub trait SubscriptionFetcher: Send + Sync {
    /// Fetch the newline-delimited proxy list behind `source`
    async fn fetch(&self, source: &str) -> std::result::Result<String, ProxyError>;
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Fetches subscriptions with `GET {url}`
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SubscriptionFetcher for HttpFetcher {
    async fn fetch(&self, source: &str) -> std::result::Result<String, ProxyError> {
        let response = self.client.get(source).send().await?;

        if !response.status().is_success() {
            return Err(ProxyError::Network(format!(
                "HTTP status: {}",
                response.status()
            )));
        }

        let content = response.text().await?;
        debug!(source, bytes = content.len(), "fetched subscription");
        Ok(content)
    }
}

/// Split a whitespace-separated list of subscription URLs
pub fn parse_sources(list: &str) -> Vec<String> {
    list.split_whitespace().map(String::from).collect()
}

/// Read subscription URLs from a file, one per line.
///
/// Blank lines and `#` comments are ignored.
pub fn read_sources_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
