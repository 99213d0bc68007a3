//! Runs every subscription source and writes the per-country lists

use crate::proxy::fetch::SubscriptionFetcher;
use crate::proxy::models::{AllowList, CountryCode, RunCounter};
use crate::proxy::partitioner::SubscriptionPartitioner;
use crate::Result;
use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Destination of the per-country proxy lists
pub trait Sink: Send {
    /// Store the complete list of one country
    fn write(&mut self, country: &CountryCode, content: &str) -> Result<()>;
}

/// Writes `{CC}.txt` files into a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the sink, creating the directory if it does not exist
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding a country's proxies
    pub fn path_for(&self, country: &CountryCode) -> PathBuf {
        self.dir.join(format!("{}.txt", country))
    }
}

impl Sink for DirectorySink {
    fn write(&mut self, country: &CountryCode, content: &str) -> Result<()> {
        let path = self.path_for(country);
        fs::write(&path, content).with_context(|| format!("writing {:?}", path))?;
        Ok(())
    }
}

/// Combined proxies of all sources, by country
pub type CountryProxies = BTreeMap<CountryCode, Vec<String>>;

/// Processes subscription sources in order and writes one list per country
pub struct Aggregator {
    fetcher: Box<dyn SubscriptionFetcher>,
    partitioner: SubscriptionPartitioner,
    sink: Box<dyn Sink>,
    counter: RunCounter,
}

impl Aggregator {
    pub fn new(
        fetcher: Box<dyn SubscriptionFetcher>,
        partitioner: SubscriptionPartitioner,
        sink: Box<dyn Sink>,
    ) -> Self {
        Self {
            fetcher,
            partitioner,
            sink,
            counter: RunCounter::new(),
        }
    }

    /// Number of proxies labeled so far in this run
    pub fn labeled(&self) -> u64 {
        self.counter.current()
    }

    /// Fetch and partition every source, then write each non-empty country.
    ///
    /// A source that cannot be fetched contributes nothing. Only sink
    /// failures abort the run.
    pub async fn run(&mut self, sources: &[String], allowed: &AllowList) -> Result<CountryProxies> {
        let mut combined = CountryProxies::new();

        for source in sources {
            let text = match self.fetcher.fetch(source).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(source = %source, error = %e, "failed to fetch subscription");
                    continue;
                }
            };

            let partition = self
                .partitioner
                .process(&text, allowed, &mut self.counter)
                .await;
            info!(source = %source, proxies = partition.len(), "processed subscription");

            for (country, proxies) in partition.into_groups() {
                combined.entry(country).or_default().extend(proxies);
            }
        }

        for (country, proxies) in combined.iter().filter(|(_, p)| !p.is_empty()) {
            self.sink.write(country, &render(proxies))?;
        }

        Ok(combined)
    }
}

/// Join proxies with newlines, ending with a trailing newline
pub fn render(proxies: &[String]) -> String {
    let mut content = proxies.join("\n");
    content.push('\n');
    content
}
