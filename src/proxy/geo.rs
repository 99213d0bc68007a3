//! Geolocation module for labeling proxies with the country of their server

use crate::proxy::error::ProxyError;
use crate::proxy::models::CountryCode;
use crate::Result;
use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use reqwest::Client;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for geolocation requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Source of country codes for IP addresses
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Look up the country code of an IP address.
    ///
    /// `Ok(None)` means the service answered but knows no country.
    async fn country_code(&self, ip: IpAddr) -> std::result::Result<Option<String>, ProxyError>;
}

/// Response body of an ip-api compatible service
#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Geolocation over HTTP: `GET {base_url}/{ip}` returning JSON with `countryCode`
pub struct HttpGeoLookup {
    base_url: String,
    client: Client,
}

impl HttpGeoLookup {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn country_code(&self, ip: IpAddr) -> std::result::Result<Option<String>, ProxyError> {
        let url = format!("{}/{}", self.base_url, ip);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProxyError::Network(format!(
                "HTTP status: {}",
                response.status()
            )));
        }

        let body: GeoResponse = response.json().await?;
        Ok(body.country_code)
    }
}

/// Offline geolocation backed by a MaxMind City database
pub struct MmdbGeoLookup {
    reader: Reader<Vec<u8>>,
}

impl MmdbGeoLookup {
    /// Open an MMDB file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoLookup for MmdbGeoLookup {
    async fn country_code(&self, ip: IpAddr) -> std::result::Result<Option<String>, ProxyError> {
        let lookup_result = self
            .reader
            .lookup(ip)
            .map_err(|e| ProxyError::Network(format!("mmdb lookup failed: {}", e)))?;

        let city: Option<geoip2::City> = lookup_result
            .decode()
            .map_err(|e| ProxyError::Network(format!("mmdb record unreadable: {}", e)))?;

        Ok(city.and_then(|city| city.country.iso_code.map(String::from)))
    }
}

/// Resolves proxy hosts to countries and renders country flags
pub struct CountryLabeler {
    lookup: Box<dyn GeoLookup>,
    resolve_timeout: Duration,
}

impl CountryLabeler {
    pub fn new(lookup: Box<dyn GeoLookup>) -> Self {
        Self {
            lookup,
            resolve_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Resolve a host name or IP address to the country it is located in.
    ///
    /// Any failure is logged and yields `None`.
    pub async fn resolve(&self, host: &str) -> Option<CountryCode> {
        let ip = match self.resolve_ip(host).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(host, error = %e, "could not resolve host");
                return None;
            }
        };

        match self.lookup.country_code(ip).await {
            Ok(Some(code)) => {
                let country = CountryCode::parse(&code);
                if country.is_none() {
                    warn!(host, %ip, code = %code, "geolocation returned an invalid country code");
                }
                country
            }
            Ok(None) => {
                warn!(host, %ip, "geolocation returned no country");
                None
            }
            Err(e) => {
                warn!(host, %ip, error = %e, "geolocation lookup failed");
                None
            }
        }
    }

    /// Render a country code as its flag glyphs
    pub fn to_flag_glyphs(country: &CountryCode) -> String {
        country.flag_glyphs()
    }

    async fn resolve_ip(&self, host: &str) -> std::result::Result<IpAddr, ProxyError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<SocketAddr> =
            tokio::time::timeout(self.resolve_timeout, tokio::net::lookup_host((host, 0)))
                .await
                .map_err(|_| ProxyError::Network(format!("DNS lookup for {} timed out", host)))?
                .map_err(|e| ProxyError::Network(format!("DNS lookup for {} failed: {}", host, e)))?
                .collect();

        let ip = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| ProxyError::Network(format!("no addresses found for {}", host)))?;

        debug!(host, %ip, "resolved host");
        Ok(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Geolocation stub answering from a fixed table
    struct StubLookup {
        answers: HashMap<IpAddr, std::result::Result<Option<String>, u16>>,
    }

    impl StubLookup {
        fn new(answers: Vec<(&str, std::result::Result<Option<&str>, u16>)>) -> Self {
            Self {
                answers: answers
                    .into_iter()
                    .map(|(ip, answer)| {
                        (ip.parse().unwrap(), answer.map(|c| c.map(String::from)))
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl GeoLookup for StubLookup {
        async fn country_code(
            &self,
            ip: IpAddr,
        ) -> std::result::Result<Option<String>, ProxyError> {
            match self.answers.get(&ip) {
                Some(Ok(code)) => Ok(code.clone()),
                Some(Err(status)) => Err(ProxyError::Network(format!("HTTP status: {}", status))),
                None => Ok(None),
            }
        }
    }

    /// Serve a single HTTP response on a local port and return the base URL
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/json/", addr)
    }

    #[tokio::test]
    async fn test_resolve_literal_ip() {
        let labeler = CountryLabeler::new(Box::new(StubLookup::new(vec![(
            "1.2.3.4",
            Ok(Some("us")),
        )])));
        let country = labeler.resolve("1.2.3.4").await;
        assert_eq!(country, CountryCode::parse("US"));
    }

    #[tokio::test]
    async fn test_resolve_bracketed_ipv6() {
        let labeler = CountryLabeler::new(Box::new(StubLookup::new(vec![(
            "2001:db8::1",
            Ok(Some("DE")),
        )])));
        assert_eq!(labeler.resolve("[2001:db8::1]").await, CountryCode::parse("DE"));
    }

    #[tokio::test]
    async fn test_resolve_hostname() {
        let labeler = CountryLabeler::new(Box::new(StubLookup::new(vec![
            ("127.0.0.1", Ok(Some("NL"))),
            ("::1", Ok(Some("NL"))),
        ])));
        assert_eq!(labeler.resolve("localhost").await, CountryCode::parse("NL"));
    }

    #[tokio::test]
    async fn test_resolve_failures_yield_none() {
        let labeler = CountryLabeler::new(Box::new(StubLookup::new(vec![
            ("1.1.1.1", Err(500)),
            ("2.2.2.2", Ok(None)),
            ("3.3.3.3", Ok(Some("USA"))),
        ])));

        assert_eq!(labeler.resolve("1.1.1.1").await, None);
        assert_eq!(labeler.resolve("2.2.2.2").await, None);
        assert_eq!(labeler.resolve("3.3.3.3").await, None);
        assert_eq!(labeler.resolve("name.invalid").await, None);
    }

    #[test]
    fn test_to_flag_glyphs() {
        let us = CountryCode::parse("us").unwrap();
        assert_eq!(CountryLabeler::to_flag_glyphs(&us), "\u{1F1FA}\u{1F1F8}");
        assert_eq!(
            CountryLabeler::to_flag_glyphs(&us),
            CountryLabeler::to_flag_glyphs(&us)
        );
    }

    #[test]
    fn test_http_lookup_trims_base_url() {
        let lookup = HttpGeoLookup::new("http://ip-api.com/json/").unwrap();
        assert_eq!(lookup.base_url(), "http://ip-api.com/json");
    }

    #[tokio::test]
    async fn test_http_lookup_success() {
        let base = serve_once("200 OK", r#"{"status":"success","countryCode":"JP"}"#).await;
        let lookup = HttpGeoLookup::new(&base).unwrap();
        let code = lookup.country_code("8.8.8.8".parse().unwrap()).await.unwrap();
        assert_eq!(code.as_deref(), Some("JP"));
    }

    #[tokio::test]
    async fn test_http_lookup_missing_country() {
        let base = serve_once("200 OK", r#"{"status":"fail","message":"reserved range"}"#).await;
        let lookup = HttpGeoLookup::new(&base).unwrap();
        let code = lookup.country_code("10.0.0.1".parse().unwrap()).await.unwrap();
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn test_http_lookup_server_error() {
        let base = serve_once("500 Internal Server Error", "{}").await;
        let lookup = HttpGeoLookup::new(&base).unwrap();
        let result = lookup.country_code("8.8.4.4".parse().unwrap()).await;
        assert!(matches!(result, Err(ProxyError::Network(_))));
    }

    #[tokio::test]
    async fn test_http_lookup_malformed_body() {
        let base = serve_once("200 OK", "not json").await;
        let lookup = HttpGeoLookup::new(&base).unwrap();
        let result = lookup.country_code("8.8.4.4".parse().unwrap()).await;
        assert!(matches!(result, Err(ProxyError::Network(_))));
    }

    #[test]
    fn test_mmdb_missing_file() {
        assert!(MmdbGeoLookup::from_path("/nonexistent/GeoLite2-City.mmdb").is_err());
    }
}
