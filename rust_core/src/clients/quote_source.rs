//! Quote Source Trait
//!
//! Defines the interface for remote services that price a batch of assets
//! in a single reference currency. The production implementation is
//! CoinGecko; tests substitute in-memory sources.

use crate::error::PriceFetchError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Unit prices keyed by the provider's own asset identifier.
pub type ProviderQuotes = HashMap<String, Decimal>;

/// Common trait for batched price sources
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Get the source's display name (e.g., "CoinGecko")
    fn provider_name(&self) -> &str;

    /// Fetch current unit prices for every provider id in one request
    ///
    /// # Arguments
    /// * `provider_ids` - Provider-specific identifiers (e.g., "bitcoin")
    /// * `quote_currency` - Reference currency code (e.g., "usd")
    ///
    /// # Returns
    /// * `Ok(ProviderQuotes)` - Prices for the ids the service knows (unknown ids are absent)
    /// * `Err(PriceFetchError)` - Network, status or decode failure; no partial result
    async fn fetch_quotes(
        &self,
        provider_ids: &[String],
        quote_currency: &str,
    ) -> Result<ProviderQuotes, PriceFetchError>;
}
