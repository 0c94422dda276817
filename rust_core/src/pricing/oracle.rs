//! Batch price resolution
//!
//! One quote request per batch: symbols are translated to provider ids,
//! priced together, and re-keyed back to symbols into an immutable
//! [`SymbolPriceMap`] that the enrichment stage reads from.

use super::mapping::ProviderIdMapping;
use crate::clients::quote_source::{ProviderQuotes, QuoteSource};
use crate::error::{NotFoundError, PriceFetchError};
use crate::retry::{execute_with_retry, RetryPolicy};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unit prices for one batch, keyed by symbol. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolPriceMap {
    prices: HashMap<String, Decimal>,
}

impl SymbolPriceMap {
    pub fn get_price(&self, symbol: &str) -> Result<Decimal, NotFoundError> {
        self.prices.get(symbol).copied().ok_or_else(|| NotFoundError {
            symbol: symbol.to_string(),
        })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.prices.iter().map(|(s, p)| (s.as_str(), *p))
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for SymbolPriceMap {
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().map(|(s, p)| (s.into(), p)).collect(),
        }
    }
}

/// Should a failed quote request be sent again?
fn is_retriable(err: &PriceFetchError) -> bool {
    match err {
        PriceFetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        PriceFetchError::Status { status, .. } => *status == 429 || *status >= 500,
        PriceFetchError::Decode(_) => false,
    }
}

pub struct PriceOracle {
    source: Arc<dyn QuoteSource>,
    mapping: Arc<ProviderIdMapping>,
    quote_currency: String,
    retry: RetryPolicy,
}

impl PriceOracle {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        mapping: Arc<ProviderIdMapping>,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            source,
            mapping,
            quote_currency: quote_currency.into(),
            retry: RetryPolicy::once(),
        }
    }

    /// Retry the whole batched request on transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    pub fn mapping(&self) -> &ProviderIdMapping {
        &self.mapping
    }

    /// Provider ids for the mapped symbols. Unmapped symbols are dropped
    /// here and surface later as `NotFoundError` on lookup.
    pub fn resolve_provider_ids(&self, symbols: &BTreeSet<String>) -> Vec<String> {
        symbols
            .iter()
            .filter_map(|symbol| match self.mapping.provider_id(symbol) {
                Some(id) => Some(id.to_string()),
                None => {
                    debug!("No provider id for symbol {}", symbol);
                    None
                }
            })
            .collect()
    }

    /// One request for all ids. No request is made for an empty id list.
    pub async fn fetch_quotes(
        &self,
        provider_ids: &[String],
    ) -> Result<ProviderQuotes, PriceFetchError> {
        if provider_ids.is_empty() {
            debug!("No provider ids to price, skipping quote request");
            return Ok(ProviderQuotes::new());
        }

        let source = self.source.clone();
        let currency = self.quote_currency.as_str();
        let outcome = execute_with_retry(
            || {
                let source = source.clone();
                async move { source.fetch_quotes(provider_ids, currency).await }
            },
            &self.retry,
            is_retriable,
        )
        .await;

        if outcome.attempts > 1 {
            warn!(
                "{} quote request took {} attempts",
                self.source.provider_name(),
                outcome.attempts
            );
        }
        outcome.result
    }

    /// Re-key provider quotes to symbols through the reverse mapping.
    pub fn build_symbol_price_map(
        quotes: ProviderQuotes,
        mapping: &ProviderIdMapping,
    ) -> SymbolPriceMap {
        quotes
            .into_iter()
            .filter_map(|(provider_id, price)| match mapping.symbol(&provider_id) {
                Some(symbol) => Some((symbol.to_string(), price)),
                None => {
                    debug!("Ignoring quote for unmapped provider id {}", provider_id);
                    None
                }
            })
            .collect()
    }

    /// Resolve, fetch and re-key in one step.
    pub async fn load_prices(
        &self,
        symbols: &BTreeSet<String>,
    ) -> Result<SymbolPriceMap, PriceFetchError> {
        let provider_ids = self.resolve_provider_ids(symbols);
        if provider_ids.len() < symbols.len() {
            warn!(
                "{} of {} symbols have no provider id",
                symbols.len() - provider_ids.len(),
                symbols.len()
            );
        }

        let quotes = self.fetch_quotes(&provider_ids).await?;
        let prices = Self::build_symbol_price_map(quotes, &self.mapping);

        info!(
            "Loaded {} {} prices from {} for {} symbols",
            prices.len(),
            self.quote_currency,
            self.source.provider_name(),
            symbols.len()
        );
        Ok(prices)
    }
}
