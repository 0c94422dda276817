//! Configuration for enrichment_service_rust

use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use txflow_rust_core::clients::coingecko::DEFAULT_BASE_URL;
use txflow_rust_core::pipeline::{ErrorPolicy, PipelineOptions};
use txflow_rust_core::redis::RedisSinkMode;
use txflow_rust_core::retry::RetryPolicy;

/// Where enriched records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Redis,
    Stdout,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(SinkKind::Redis),
            "stdout" => Ok(SinkKind::Stdout),
            other => Err(format!("unknown sink '{}', expected redis or stdout", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    // Input
    /// File path, or `-` for stdin
    pub input_path: String,

    // Pricing
    pub quote_currency: String,
    pub price_fetch_timeout_secs: u64,
    pub price_fetch_attempts: u32,
    pub coingecko_base_url: String,
    pub coingecko_api_key: Option<String>,
    pub provider_id_mapping_path: Option<PathBuf>,

    // Policies
    pub row_policy: ErrorPolicy,
    pub price_miss_policy: ErrorPolicy,

    // Sink
    pub sink: SinkKind,
    pub redis_url: String,
    pub redis_topic: String,
    pub redis_sink_mode: RedisSinkMode,

    // Delivery
    pub delivery_max_attempts: u32,
    pub delivery_base_backoff_ms: u64,
    pub delivery_max_backoff_ms: u64,
    pub dead_letter_path: Option<PathBuf>,
    pub emit_concurrency: usize,
}

impl EnrichmentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. `from_env` reads the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let input_path = var("INPUT_PATH").ok_or_else(|| anyhow!("INPUT_PATH must be set"))?;

        let quote_currency = var("QUOTE_CURRENCY")
            .unwrap_or_else(|| "usd".to_string())
            .trim()
            .to_lowercase();

        let price_fetch_timeout_secs = parse_u64(&var, "PRICE_FETCH_TIMEOUT_SECS", 10)?;
        let price_fetch_attempts = parse_u32(&var, "PRICE_FETCH_ATTEMPTS", 1)?;
        let delivery_max_attempts = parse_u32(&var, "DELIVERY_MAX_ATTEMPTS", 3)?;
        let delivery_base_backoff_ms = parse_u64(&var, "DELIVERY_BASE_BACKOFF_MS", 100)?;
        let delivery_max_backoff_ms = parse_u64(&var, "DELIVERY_MAX_BACKOFF_MS", 5000)?;
        let emit_concurrency = parse_usize(&var, "EMIT_CONCURRENCY", 1)?;

        // Validate
        if quote_currency.is_empty() || !quote_currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("QUOTE_CURRENCY must be an alphanumeric currency code"));
        }
        if price_fetch_timeout_secs == 0 {
            return Err(anyhow!("PRICE_FETCH_TIMEOUT_SECS must be > 0"));
        }
        if price_fetch_attempts == 0 {
            return Err(anyhow!("PRICE_FETCH_ATTEMPTS must be >= 1"));
        }
        if delivery_max_attempts == 0 {
            return Err(anyhow!("DELIVERY_MAX_ATTEMPTS must be >= 1"));
        }
        if delivery_max_backoff_ms < delivery_base_backoff_ms {
            return Err(anyhow!(
                "DELIVERY_MAX_BACKOFF_MS must be >= DELIVERY_BASE_BACKOFF_MS"
            ));
        }
        if emit_concurrency == 0 {
            return Err(anyhow!("EMIT_CONCURRENCY must be >= 1"));
        }

        Ok(Self {
            input_path,
            quote_currency,
            price_fetch_timeout_secs,
            price_fetch_attempts,

            coingecko_base_url: var("COINGECKO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            coingecko_api_key: var("COINGECKO_API_KEY"),
            provider_id_mapping_path: var("PROVIDER_ID_MAPPING_PATH").map(PathBuf::from),

            row_policy: parse_enum(&var, "ROW_ERROR_POLICY", ErrorPolicy::FailFast)?,
            price_miss_policy: parse_enum(&var, "PRICE_MISS_POLICY", ErrorPolicy::FailFast)?,

            sink: parse_enum(&var, "SINK", SinkKind::Redis)?,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            redis_topic: var("REDIS_TOPIC").unwrap_or_else(|| "transactions".to_string()),
            redis_sink_mode: parse_enum(&var, "REDIS_SINK_MODE", RedisSinkMode::Publish)?,

            delivery_max_attempts,
            delivery_base_backoff_ms,
            delivery_max_backoff_ms,
            dead_letter_path: var("DEAD_LETTER_PATH").map(PathBuf::from),
            emit_concurrency,
        })
    }

    pub fn delivery_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.delivery_max_attempts,
            self.delivery_base_backoff_ms,
            self.delivery_max_backoff_ms,
        )
    }

    /// Whole-request retry for the quote fetch. Shares the delivery backoff.
    pub fn price_fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.price_fetch_attempts,
            self.delivery_base_backoff_ms,
            self.delivery_max_backoff_ms,
        )
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            row_policy: self.row_policy,
            price_miss_policy: self.price_miss_policy,
            delivery_retry: self.delivery_retry(),
            emit_concurrency: self.emit_concurrency,
        }
    }

    /// Log current configuration (useful at startup)
    pub fn log_config(&self) {
        info!("EnrichmentConfig loaded:");
        info!("  input: {}", self.input_path);
        info!("  quote_currency: {}", self.quote_currency);
        info!(
            "  price source: {} (timeout {}s, {} attempt(s), api key {})",
            self.coingecko_base_url,
            self.price_fetch_timeout_secs,
            self.price_fetch_attempts,
            if self.coingecko_api_key.is_some() { "set" } else { "unset" }
        );
        match &self.provider_id_mapping_path {
            Some(path) => info!("  provider id mapping: {}", path.display()),
            None => info!("  provider id mapping: built-in"),
        }
        info!(
            "  policies: rows={:?} price_miss={:?}",
            self.row_policy, self.price_miss_policy
        );
        match self.sink {
            SinkKind::Redis => info!(
                "  sink: redis {:?} '{}' at {}",
                self.redis_sink_mode, self.redis_topic, self.redis_url
            ),
            SinkKind::Stdout => info!("  sink: stdout"),
        }
        info!(
            "  delivery: {} attempt(s), backoff {}-{}ms, concurrency {}",
            self.delivery_max_attempts,
            self.delivery_base_backoff_ms,
            self.delivery_max_backoff_ms,
            self.emit_concurrency
        );
        if let Some(path) = &self.dead_letter_path {
            info!("  dead letters: {}", path.display());
        }
    }
}

/// Parse variable as u32 with default fallback
fn parse_u32<F: Fn(&str) -> Option<String>>(var: &F, var_name: &str, default: u32) -> Result<u32> {
    match var(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u32", var_name)),
        None => Ok(default),
    }
}

/// Parse variable as u64 with default fallback
fn parse_u64<F: Fn(&str) -> Option<String>>(var: &F, var_name: &str, default: u64) -> Result<u64> {
    match var(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        None => Ok(default),
    }
}

/// Parse variable as usize with default fallback
fn parse_usize<F: Fn(&str) -> Option<String>>(
    var: &F,
    var_name: &str,
    default: usize,
) -> Result<usize> {
    match var(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid usize", var_name)),
        None => Ok(default),
    }
}

fn parse_enum<F, T>(var: &F, var_name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String>,
{
    match var(var_name) {
        Some(val) => val.parse().map_err(|e| anyhow!("{}: {}", var_name, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EnrichmentConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnrichmentConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("INPUT_PATH", "tx.csv")]).unwrap();
        assert_eq!(config.input_path, "tx.csv");
        assert_eq!(config.quote_currency, "usd");
        assert_eq!(config.price_fetch_timeout_secs, 10);
        assert_eq!(config.price_fetch_attempts, 1);
        assert_eq!(config.coingecko_base_url, DEFAULT_BASE_URL);
        assert!(config.coingecko_api_key.is_none());
        assert!(config.provider_id_mapping_path.is_none());
        assert_eq!(config.row_policy, ErrorPolicy::FailFast);
        assert_eq!(config.price_miss_policy, ErrorPolicy::FailFast);
        assert_eq!(config.sink, SinkKind::Redis);
        assert_eq!(config.redis_topic, "transactions");
        assert_eq!(config.redis_sink_mode, RedisSinkMode::Publish);
        assert_eq!(config.delivery_max_attempts, 3);
        assert_eq!(config.emit_concurrency, 1);
        assert!(config.dead_letter_path.is_none());
    }

    #[test]
    fn test_input_path_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("INPUT_PATH", "  ")]).is_err());
    }

    #[test]
    fn test_policies_and_sink() {
        let config = config_from(&[
            ("INPUT_PATH", "-"),
            ("ROW_ERROR_POLICY", "skip"),
            ("PRICE_MISS_POLICY", "Skip"),
            ("SINK", "stdout"),
            ("REDIS_SINK_MODE", "list"),
            ("QUOTE_CURRENCY", "EUR"),
        ])
        .unwrap();
        assert_eq!(config.row_policy, ErrorPolicy::Skip);
        assert_eq!(config.price_miss_policy, ErrorPolicy::Skip);
        assert_eq!(config.sink, SinkKind::Stdout);
        assert_eq!(config.redis_sink_mode, RedisSinkMode::List);
        assert_eq!(config.quote_currency, "eur");

        let options = config.pipeline_options();
        assert_eq!(options.row_policy, ErrorPolicy::Skip);
        assert_eq!(options.delivery_retry.max_attempts, 3);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(config_from(&[("INPUT_PATH", "x"), ("ROW_ERROR_POLICY", "retry")]).is_err());
        assert!(config_from(&[("INPUT_PATH", "x"), ("SINK", "kafka")]).is_err());
        assert!(config_from(&[("INPUT_PATH", "x"), ("EMIT_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("INPUT_PATH", "x"), ("DELIVERY_MAX_ATTEMPTS", "abc")]).is_err());
        assert!(config_from(&[("INPUT_PATH", "x"), ("PRICE_FETCH_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[
            ("INPUT_PATH", "x"),
            ("DELIVERY_BASE_BACKOFF_MS", "500"),
            ("DELIVERY_MAX_BACKOFF_MS", "100"),
        ])
        .is_err());
    }

    #[test]
    fn test_parse_u64_with_default() {
        let missing = |_: &str| -> Option<String> { None };
        assert_eq!(parse_u64(&missing, "NON_EXISTENT_VAR_ABC", 100).unwrap(), 100);
    }
}
