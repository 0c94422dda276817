//! CoinGecko API Client
//!
//! Prices a batch of coins through the `/simple/price` endpoint. All ids
//! travel in one request, comma-joined.

use super::quote_source::{ProviderQuotes, QuoteSource};
use crate::error::PriceFetchError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header CoinGecko reads the demo-plan API key from
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Response of `/simple/price`: coin id -> currency -> price
type SimplePriceResponse = HashMap<String, HashMap<String, Decimal>>;

/// CoinGecko API client
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    /// Create a client against the public API with the default 10s timeout
    pub fn new() -> Result<Self, PriceFetchError> {
        Self::with_options(DEFAULT_BASE_URL, DEFAULT_TIMEOUT, None)
    }

    pub fn with_options(
        base_url: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, PriceFetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("txflow/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// URL for a batched price query
    pub fn simple_price_url(&self, provider_ids: &[String], quote_currency: &str) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            provider_ids.join(","),
            quote_currency
        )
    }
}

/// Keep only the prices quoted in the requested currency.
fn select_currency(response: SimplePriceResponse, quote_currency: &str) -> ProviderQuotes {
    let currency = quote_currency.to_lowercase();
    response
        .into_iter()
        .filter_map(|(id, mut prices)| prices.remove(&currency).map(|price| (id, price)))
        .collect()
}

#[async_trait]
impl QuoteSource for CoinGeckoClient {
    fn provider_name(&self) -> &str {
        "CoinGecko"
    }

    async fn fetch_quotes(
        &self,
        provider_ids: &[String],
        quote_currency: &str,
    ) -> Result<ProviderQuotes, PriceFetchError> {
        let url = self.simple_price_url(provider_ids, quote_currency);

        debug!("Fetching prices for {} coins from CoinGecko", provider_ids.len());

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PriceFetchError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: SimplePriceResponse =
            serde_json::from_str(&body).map_err(|e| PriceFetchError::Decode(e.to_string()))?;

        Ok(select_currency(parsed, quote_currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_simple_price_url() {
        let client =
            CoinGeckoClient::with_options("http://localhost:9999/api/v3/", DEFAULT_TIMEOUT, None)
                .unwrap();
        let url = client.simple_price_url(&["bitcoin".to_string(), "ethereum".to_string()], "usd");
        assert_eq!(
            url,
            "http://localhost:9999/api/v3/simple/price?ids=bitcoin,ethereum&vs_currencies=usd"
        );
    }

    #[test]
    fn test_decode_and_select_currency() {
        let body = r#"{
            "bitcoin": {"usd": 20000},
            "ethereum": {"usd": 1834.07},
            "cardano": {"eur": 0.25}
        }"#;
        let parsed: SimplePriceResponse = serde_json::from_str(body).unwrap();
        let quotes = select_currency(parsed, "USD");

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["bitcoin"], dec!(20000));
        assert_eq!(quotes["ethereum"], dec!(1834.07));
        assert!(!quotes.contains_key("cardano"));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_quotes_live() {
        let client = CoinGeckoClient::new().unwrap();
        let quotes = client
            .fetch_quotes(&["bitcoin".to_string()], "usd")
            .await
            .unwrap();
        assert!(quotes["bitcoin"] > Decimal::ZERO);
    }
}
