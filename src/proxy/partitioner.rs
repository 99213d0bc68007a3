//! Splits one subscription into relabeled proxies grouped by country

use crate::proxy::codec::ProxyCodec;
use crate::proxy::geo::CountryLabeler;
use crate::proxy::models::{
    AllowList, Label, LabeledProxy, PartitionResult, ProxyRecord, RunCounter, Scheme,
};
use futures::stream::{self, StreamExt};
use tracing::debug;

/// Default number of concurrent country lookups
const DEFAULT_CONCURRENCY: usize = 10;

pub struct SubscriptionPartitioner {
    labeler: CountryLabeler,
    concurrency: usize,
}

impl SubscriptionPartitioner {
    pub fn new(labeler: CountryLabeler) -> Self {
        Self {
            labeler,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bound the number of country lookups in flight. One means strictly
    /// sequential lookups.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Relabel every supported proxy line of `text` and group the results by
    /// country.
    ///
    /// Lookups may overlap, but labels are numbered and grouped in line
    /// order. The counter advances for every proxy whose country resolves,
    /// including proxies of countries outside `allowed`.
    pub async fn process(
        &self,
        text: &str,
        allowed: &AllowList,
        counter: &mut RunCounter,
    ) -> PartitionResult {
        let records = Self::decode_lines(text);

        let labeler = &self.labeler;
        let resolved: Vec<_> = stream::iter(records)
            .map(|record| async move {
                let country = labeler.resolve(&record.host).await;
                (record, country)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut result = PartitionResult::new(allowed);
        for (record, country) in resolved {
            let Some(country) = country else {
                debug!(
                    host = %record.host,
                    label = record.label().unwrap_or_default(),
                    "skipping proxy without country"
                );
                continue;
            };

            let label = Label::new(&country, counter.advance());
            let proxy = ProxyCodec::reencode(&record, &label);

            if let Err(rejected) = result.push(LabeledProxy::new(proxy, country)) {
                debug!(
                    host = %record.host,
                    label = record.label().unwrap_or_default(),
                    country = %rejected.country(),
                    "skipping proxy outside the allowed countries"
                );
            }
        }

        result
    }

    /// Decode the supported lines of a subscription, in order
    fn decode_lines(text: &str) -> Vec<ProxyRecord> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let scheme = Scheme::detect(line)?;
                match ProxyCodec::decode(scheme, line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!(line, error = %e, "skipping undecodable proxy");
                        None
                    }
                }
            })
            .collect()
    }
}
