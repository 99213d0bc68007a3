use anyhow::Result;
use clap::Parser;
use proxy_sorter::{
    fetch::{parse_sources, read_sources_file},
    Aggregator, AllowList, Config, CountryLabeler, DirectorySink, FetcherConfig, GeoLookup,
    HttpFetcher, HttpGeoLookup, MmdbGeoLookup, SubscriptionPartitioner, DEFAULT_GEO_API_URL,
    DEFAULT_OUTPUT_DIR,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Relabel vmess/vless subscription proxies by country and split them into
/// per-country lists
#[derive(Parser)]
#[command(name = "proxy-sorter")]
#[command(about = "Relabel vmess/vless subscription proxies by country")]
struct Cli {
    /// Subscription URLs, separated by whitespace
    sources: String,

    /// Country codes to keep, separated by commas (e.g. "US,DE,NL")
    countries: String,

    /// File with additional subscription URLs (one URL per line)
    #[arg(short = 'f', long)]
    sources_file: Option<PathBuf>,

    /// Directory for the per-country files
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Base URL of the geolocation service
    #[arg(long, env = "GET_IPGEO", default_value = DEFAULT_GEO_API_URL)]
    geo_api: String,

    /// Look up countries in a MaxMind City database instead of the service
    #[arg(long)]
    mmdb: Option<PathBuf>,

    /// Maximum concurrent country lookups per subscription
    #[arg(short = 'n', long, default_value = "10")]
    concurrency: usize,

    /// Timeout in seconds for geolocation lookups
    #[arg(long, default_value = "5")]
    geo_timeout: u64,

    /// Timeout in seconds for subscription requests
    #[arg(long, default_value = "10")]
    fetch_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let allowed = AllowList::parse(&cli.countries);
    if allowed.is_empty() {
        warn!(countries = %cli.countries, "no valid country codes given, nothing will be written");
    }
    let mut sources = parse_sources(&cli.sources);
    if let Some(file_path) = &cli.sources_file {
        let extra = read_sources_file(file_path)?;
        info!(path = ?file_path, count = extra.len(), "loaded sources from file");
        sources.extend(extra);
    }

    let mut config = Config::new()
        .with_geo_api_url(cli.geo_api)
        .with_output_dir(cli.output_dir)
        .with_concurrency(cli.concurrency)
        .with_geo_timeout(Duration::from_secs(cli.geo_timeout))
        .with_fetch_timeout(Duration::from_secs(cli.fetch_timeout));
    if let Some(path) = cli.mmdb {
        config = config.with_mmdb_path(path);
    }

    let mut aggregator = build_aggregator(&config)?;

    info!(
        sources = sources.len(),
        countries = allowed.len(),
        "processing subscriptions"
    );
    let results = aggregator.run(&sources, &allowed).await?;

    for (country, proxies) in &results {
        info!(country = %country, proxies = proxies.len(), "country summary");
    }
    info!(
        labeled = aggregator.labeled(),
        output = ?config.output_dir,
        "done"
    );

    Ok(())
}

fn build_aggregator(config: &Config) -> Result<Aggregator> {
    let lookup: Box<dyn GeoLookup> = match &config.mmdb_path {
        Some(path) => Box::new(MmdbGeoLookup::from_path(path)?),
        None => Box::new(HttpGeoLookup::with_timeout(
            &config.geo_api_url,
            config.geo_timeout,
        )?),
    };

    let labeler = CountryLabeler::new(lookup).with_resolve_timeout(config.geo_timeout);
    let partitioner = SubscriptionPartitioner::new(labeler).with_concurrency(config.concurrency);
    let fetcher =
        HttpFetcher::with_config(FetcherConfig::new().with_timeout(config.fetch_timeout))?;
    let sink = DirectorySink::new(&config.output_dir)?;

    Ok(Aggregator::new(
        Box::new(fetcher),
        partitioner,
        Box::new(sink),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_cli_requires_sources_and_countries() {
        let err = Cli::try_parse_from(["proxy-sorter"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_ne!(err.exit_code(), 0);

        let err = Cli::try_parse_from(["proxy-sorter", "https://sub.example/a"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(err.render().to_string().contains("Usage"));
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn test_cli_positional_arguments() {
        let cli = Cli::try_parse_from([
            "proxy-sorter",
            "https://a.example/sub https://b.example/sub",
            "us, de",
        ])
        .unwrap();

        assert_eq!(
            parse_sources(&cli.sources),
            vec!["https://a.example/sub", "https://b.example/sub"]
        );
        let codes: Vec<String> = AllowList::parse(&cli.countries)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(codes, vec!["US", "DE"]);
        assert_eq!(cli.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(cli.concurrency, 10);
        assert_eq!(cli.geo_timeout, 5);
        assert_eq!(cli.fetch_timeout, 10);
        assert!(cli.mmdb.is_none());
    }
}
