//! In-memory capabilities shared by the unit tests

use crate::proxy::aggregator::Sink;
use crate::proxy::error::ProxyError;
use crate::proxy::fetch::SubscriptionFetcher;
use crate::proxy::geo::GeoLookup;
use crate::proxy::models::CountryCode;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Answers lookups from a table; unknown addresses get HTTP 500
pub struct StubGeo {
    countries: HashMap<IpAddr, String>,
}

impl StubGeo {
    pub fn new(countries: &[(&str, &str)]) -> Self {
        Self {
            countries: countries
                .iter()
                .map(|(ip, code)| (ip.parse().unwrap(), code.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl GeoLookup for StubGeo {
    async fn country_code(&self, ip: IpAddr) -> Result<Option<String>, ProxyError> {
        self.countries
            .get(&ip)
            .cloned()
            .map(Some)
            .ok_or_else(|| ProxyError::Network("HTTP status: 500 Internal Server Error".to_string()))
    }
}

/// Serves subscription bodies by URL; unknown URLs fail
pub struct StubFetcher {
    bodies: HashMap<String, String>,
}

impl StubFetcher {
    pub fn new(bodies: &[(&str, &str)]) -> Self {
        Self {
            bodies: bodies
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl SubscriptionFetcher for StubFetcher {
    async fn fetch(&self, source: &str) -> Result<String, ProxyError> {
        self.bodies
            .get(source)
            .cloned()
            .ok_or_else(|| ProxyError::Network(format!("connection refused: {}", source)))
    }
}

/// Records every write
#[derive(Clone, Default)]
pub struct MemorySink {
    pub writes: Arc<Mutex<Vec<(String, String)>>>,
}

impl Sink for MemorySink {
    fn write(&mut self, country: &CountryCode, content: &str) -> crate::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((country.to_string(), content.to_string()));
        Ok(())
    }
}

/// Build a vmess line for a server address
pub fn vmess_line(add: &str, ps: &str) -> String {
    let json = serde_json::json!({
        "v": "2",
        "ps": ps,
        "add": add,
        "port": "443",
        "id": "b831381d-6324-4d53-ad4f-8cda48b30811",
        "aid": "0",
        "net": "tcp",
        "type": "none",
        "tls": ""
    });
    format!("vmess://{}", STANDARD.encode(json.to_string()))
}

/// Read the `ps` remark out of a vmess line
pub fn vmess_ps(line: &str) -> String {
    let encoded = line.strip_prefix("vmess://").unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
    json["ps"].as_str().unwrap().to_string()
}
