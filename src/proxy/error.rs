//! Error types for proxy processing

use crate::proxy::models::Scheme;
use thiserror::Error;

/// Failure of a single proxy line or subscription source
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The line could not be decoded; the line is skipped
    #[error("malformed {scheme} line: {reason}")]
    Malformed { scheme: Scheme, reason: String },

    /// Fetch, DNS or geolocation failure; the affected unit is skipped
    #[error("network error: {0}")]
    Network(String),
}

impl ProxyError {
    pub fn malformed(scheme: Scheme, reason: impl Into<String>) -> Self {
        ProxyError::Malformed {
            scheme,
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Network(format!("request timed out: {}", e))
        } else {
            ProxyError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = ProxyError::malformed(Scheme::Vmess, "missing `add` field");
        assert_eq!(err.to_string(), "malformed vmess line: missing `add` field");
    }

    #[test]
    fn test_network_display() {
        let err = ProxyError::Network("HTTP status: 500".to_string());
        assert_eq!(err.to_string(), "network error: HTTP status: 500");
    }
}
