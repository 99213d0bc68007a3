//! Proxy module for relabeling and partitioning subscriptions
//!
//! This module provides functionality for:
//! - Decoding and re-encoding vmess and vless proxy lines
//! - Resolving proxy servers to countries and rendering flag labels
//! - Fetching subscriptions and grouping their proxies by country
//! - Writing one proxy list per country

pub mod aggregator;
pub mod codec;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod models;
pub mod partitioner;

#[cfg(test)]
mod test_support;

pub use aggregator::{Aggregator, CountryProxies, DirectorySink, Sink};
pub use codec::ProxyCodec;
pub use error::ProxyError;
pub use fetch::{FetcherConfig, HttpFetcher, SubscriptionFetcher};
pub use geo::{CountryLabeler, GeoLookup, HttpGeoLookup, MmdbGeoLookup};
pub use models::{
    AllowList, CountryCode, Label, LabeledProxy, PartitionResult, Payload, ProxyRecord,
    RunCounter, Scheme,
};
pub use partitioner::SubscriptionPartitioner;
