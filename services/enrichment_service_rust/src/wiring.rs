//! Builds pipeline collaborators from [`EnrichmentConfig`]

use crate::config::{EnrichmentConfig, SinkKind};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use txflow_rust_core::clients::{CoinGeckoClient, QuoteSource};
use txflow_rust_core::pipeline::EnrichmentPipeline;
use txflow_rust_core::pricing::{PriceOracle, ProviderIdMapping};
use txflow_rust_core::redis::{RedisBus, RedisSink};
use txflow_rust_core::sink::{JsonLinesFileSink, Sink, StdoutSink};

/// Open the CSV input. `-` reads stdin.
pub fn open_input(path: &str) -> Result<Box<dyn Read + Send>> {
    if path == "-" {
        info!("Reading transactions from stdin");
        return Ok(Box::new(io::stdin()));
    }

    let file = File::open(path).with_context(|| format!("Failed to open input {}", path))?;
    info!("Reading transactions from {}", path);
    Ok(Box::new(BufReader::new(file)))
}

pub fn load_mapping(config: &EnrichmentConfig) -> Result<ProviderIdMapping> {
    let mapping = match &config.provider_id_mapping_path {
        Some(path) => ProviderIdMapping::load(path)
            .with_context(|| format!("Failed to load provider id mapping {}", path.display()))?,
        None => ProviderIdMapping::builtin(),
    };
    info!("Provider id mapping has {} symbols", mapping.len());
    Ok(mapping)
}

/// Oracle over an explicit quote source. Used by `build_oracle` and tests.
pub fn oracle_with_source(
    config: &EnrichmentConfig,
    source: Arc<dyn QuoteSource>,
    mapping: ProviderIdMapping,
) -> PriceOracle {
    PriceOracle::new(source, Arc::new(mapping), config.quote_currency.clone())
        .with_retry(config.price_fetch_retry())
}

pub fn build_oracle(config: &EnrichmentConfig) -> Result<PriceOracle> {
    let client = CoinGeckoClient::with_options(
        config.coingecko_base_url.clone(),
        Duration::from_secs(config.price_fetch_timeout_secs),
        config.coingecko_api_key.clone(),
    )
    .context("Failed to build CoinGecko client")?;

    let mapping = load_mapping(config)?;
    Ok(oracle_with_source(config, Arc::new(client), mapping))
}

pub async fn build_sink(config: &EnrichmentConfig) -> Result<Arc<dyn Sink>> {
    match config.sink {
        SinkKind::Stdout => Ok(Arc::new(StdoutSink)),
        SinkKind::Redis => {
            let bus = RedisBus::new(&config.redis_url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
            info!("Connected to Redis at {}", config.redis_url);
            Ok(Arc::new(RedisSink::new(
                bus,
                config.redis_topic.clone(),
                config.redis_sink_mode,
            )))
        }
    }
}

pub fn build_dead_letter(config: &EnrichmentConfig) -> Option<Arc<dyn Sink>> {
    config
        .dead_letter_path
        .as_ref()
        .map(|path| Arc::new(JsonLinesFileSink::new(path)) as Arc<dyn Sink>)
}

pub async fn build_pipeline(config: &EnrichmentConfig) -> Result<EnrichmentPipeline> {
    let oracle = build_oracle(config)?;
    let sink = build_sink(config).await?;

    let mut pipeline = EnrichmentPipeline::new(oracle, sink, config.pipeline_options());
    if let Some(dead_letter) = build_dead_letter(config) {
        pipeline = pipeline.with_dead_letter(dead_letter);
    }
    Ok(pipeline)
}
