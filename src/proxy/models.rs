//! Proxy data models

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Trailing tag of every generated label
pub const LABEL_SUFFIX: &str = "_@Surfboardv2ray";

/// Offset from an ASCII upper-case letter to its regional indicator symbol
const REGIONAL_INDICATOR_OFFSET: u32 = 127397;

static COUNTRY_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2}$").expect("Invalid country code regex"));

/// Supported proxy URI schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Vmess,
    Vless,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Vmess, Scheme::Vless];

    /// Literal prefix a line of this scheme starts with
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess://",
            Scheme::Vless => "vless://",
        }
    }

    /// Detect the scheme of a proxy line by its prefix
    pub fn detect(line: &str) -> Option<Scheme> {
        Self::ALL
            .into_iter()
            .find(|scheme| line.starts_with(scheme.prefix()))
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Vmess => write!(f, "vmess"),
            Scheme::Vless => write!(f, "vless"),
        }
    }
}

/// ISO 3166-1 alpha-2 country code, always two upper-case ASCII letters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode(String);

impl CountryCode {
    /// Parse a country code, accepting any letter case
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        COUNTRY_CODE_REGEX
            .is_match(code)
            .then(|| Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the code as its two regional indicator glyphs (a flag emoji)
    pub fn flag_glyphs(&self) -> String {
        self.0
            .chars()
            .map(|c| c.to_ascii_uppercase() as u32 + REGIONAL_INDICATOR_OFFSET)
            .filter_map(char::from_u32)
            .collect()
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Countries whose proxies are kept, in the order the caller listed them
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowList(Vec<CountryCode>);

impl AllowList {
    pub fn new(countries: Vec<CountryCode>) -> Self {
        let mut unique: Vec<CountryCode> = Vec::with_capacity(countries.len());
        for country in countries {
            if !unique.contains(&country) {
                unique.push(country);
            }
        }
        Self(unique)
    }

    /// Parse a comma-separated list such as `"us, de,NL"`.
    ///
    /// Entries that are not two letters can never match a proxy and are
    /// skipped with a warning. An empty list keeps nothing.
    pub fn parse(list: &str) -> Self {
        let countries = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let country = CountryCode::parse(entry);
                if country.is_none() {
                    warn!(entry, "ignoring invalid country code");
                }
                country
            })
            .collect();

        Self::new(countries)
    }

    pub fn contains(&self, country: &CountryCode) -> bool {
        self.0.contains(country)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountryCode> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Run-unique proxy name: `{flag}{CC}_{n}_@Surfboardv2ray`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label(String);

impl Label {
    pub fn new(country: &CountryCode, sequence: u64) -> Self {
        Self(format!(
            "{}{}_{}{}",
            country.flag_glyphs(),
            country,
            sequence,
            LABEL_SUFFIX
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheme-specific content of a decoded proxy line
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The full vmess JSON object, field order preserved
    Vmess(Map<String, Value>),
    /// A vless line split at its first `#`
    Vless {
        head: String,
        label: Option<String>,
    },
}

/// A decoded proxy line
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRecord {
    pub scheme: Scheme,
    pub host: String,
    pub payload: Payload,
}

impl ProxyRecord {
    /// Existing label of the proxy, if it carries one
    pub fn label(&self) -> Option<&str> {
        match &self.payload {
            Payload::Vmess(object) => object.get("ps").and_then(Value::as_str),
            Payload::Vless { label, .. } => label.as_deref(),
        }
    }
}

/// A relabeled proxy line together with its country
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledProxy {
    proxy: String,
    country: CountryCode,
}

impl LabeledProxy {
    pub fn new(proxy: String, country: CountryCode) -> Self {
        Self { proxy, country }
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn country(&self) -> &CountryCode {
        &self.country
    }

    pub fn into_proxy(self) -> String {
        self.proxy
    }
}

/// Relabeled proxies of one subscription, grouped by allowed country
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionResult {
    groups: BTreeMap<CountryCode, Vec<String>>,
}

impl PartitionResult {
    /// One empty group per allowed country
    pub fn new(allowed: &AllowList) -> Self {
        Self {
            groups: allowed.iter().map(|c| (c.clone(), Vec::new())).collect(),
        }
    }

    /// Append a proxy to its country group. Proxies of countries without a
    /// group are handed back.
    pub fn push(&mut self, labeled: LabeledProxy) -> Result<(), LabeledProxy> {
        match self.groups.get_mut(labeled.country()) {
            Some(group) => {
                group.push(labeled.into_proxy());
                Ok(())
            }
            None => Err(labeled),
        }
    }

    pub fn get(&self, country: &CountryCode) -> Option<&[String]> {
        self.groups.get(country).map(Vec::as_slice)
    }

    /// Total number of proxies across all groups
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CountryCode, &Vec<String>)> {
        self.groups.iter()
    }

    pub fn into_groups(self) -> BTreeMap<CountryCode, Vec<String>> {
        self.groups
    }
}

/// Run-wide label sequence, starting at zero
#[derive(Debug, Default)]
pub struct RunCounter {
    value: u64,
}

impl RunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new value
    pub fn advance(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    pub fn current(&self) -> u64 {
        self.value
    }
}
